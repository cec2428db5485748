//! Markdown rendering of an answer for a downstream summarizer.

use crate::period::render_all;
use crate::service::{Answer, AnswerStatus};

/// Marker appended to clipped section text.
pub const CLIP_MARKER: &str = "…（省略）";

const GUIDANCE: [&str; 3] = [
    "- 上記抽出テキストを根拠として回答すること。",
    "- 根拠にない推測は避け、不足情報は不足と明示すること。",
    "- 期ごとの差異を混同しないこと。",
];

const NO_TEXT_GUIDANCE: [&str; 2] = [
    "- 今回は本文を取得できていないため、一般知識ベースで回答しないこと。",
    "- 取得できなかった理由のみを簡潔に伝え、再実行に必要な情報（企業コード/決算期/セクション）を案内すること。",
];

/// Clip `text` to `max_chars` characters, marking the cut.
pub fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n{}", &text[..cut], CLIP_MARKER),
        None => text.to_string(),
    }
}

/// Render `answer` to `question` as a prompt block.
///
/// Section texts are clipped to `max_chars` characters each.
pub fn render_context(question: &str, answer: &Answer, max_chars: usize) -> String {
    let mut out = String::new();
    out.push_str("# EDINET有報抽出コンテキスト\n");
    out.push_str(&format!("質問: {question}\n"));

    match answer.status {
        AnswerStatus::Resolved => render_resolved(answer, max_chars, &mut out),
        AnswerStatus::Ambiguous => {
            out.push_str(&format!("\n{}\n", answer.message));
            out.push_str("\n企業候補:\n");
            for issuer in &answer.candidates {
                out.push_str(&format!("- {issuer}\n"));
            }
            out.push_str("\n回答ガイド:\n");
            out.push_str("- 候補から対象企業を確認し、EDINETコード（例: E02144）での再指定を依頼すること。\n");
        }
        AnswerStatus::NotFound | AnswerStatus::ParseError => {
            out.push_str(&format!("\n{}\n", answer.message));
            out.push_str("\n回答ガイド:\n");
            for line in NO_TEXT_GUIDANCE {
                out.push_str(&format!("{line}\n"));
            }
        }
    }
    out.trim_end().to_string()
}

fn render_resolved(answer: &Answer, max_chars: usize, out: &mut String) {
    if let Some(issuer) = &answer.issuer {
        out.push_str(&format!("企業: {issuer}\n"));
    }
    out.push_str(&format!("対象期: {}\n", render_all(&answer.periods)));
    let sections: Vec<String> = answer.sections.iter().map(ToString::to_string).collect();
    out.push_str(&format!("セクション: {}\n", sections.join("、")));

    let mut current = None;
    let mut missing = Vec::new();
    for context in &answer.contexts {
        if current != Some(context.period) {
            current = Some(context.period);
            out.push_str(&format!(
                "\n## {} (docID={})\n",
                context.period, context.source_document_id
            ));
        }
        if context.section_missing {
            out.push_str(&format!("\n### {}: 該当セクションなし\n", context.section));
            missing.push(format!("{} {}", context.period, context.section));
            continue;
        }
        match &context.source_tag {
            Some(tag) => {
                out.push_str(&format!("\n### {} [tag={}]\n", context.section, tag));
            }
            None => {
                out.push_str(&format!("\n### {}\n", context.section));
            }
        }
        out.push_str(&format!("{}\n", clip(&context.text, max_chars)));
    }

    if !missing.is_empty() {
        out.push_str("\n未取得セクション:\n");
        for item in &missing {
            out.push_str(&format!("- {item}\n"));
        }
    }

    out.push_str("\n回答ガイド:\n");
    for line in GUIDANCE {
        out.push_str(&format!("{line}\n"));
    }
    if answer.contexts.iter().all(|c| c.section_missing) {
        for line in NO_TEXT_GUIDANCE {
            out.push_str(&format!("{line}\n"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ExtractionContext;
    use crate::sections::SectionCode;
    use yuho_data::{Issuer, PeriodKey};

    fn toyota() -> Issuer {
        Issuer::new("E02144", "トヨタ自動車株式会社").with_securities_code("7203")
    }

    fn context(section: SectionCode, text: &str) -> ExtractionContext {
        ExtractionContext {
            issuer: toyota(),
            period: PeriodKey::full_year(2024),
            section,
            text: text.to_string(),
            source_document_id: "S100AMND".to_string(),
            section_missing: text.is_empty(),
            source_tag: (!text.is_empty()).then(|| section.tags()[0].to_string()),
        }
    }

    fn resolved(contexts: Vec<ExtractionContext>) -> Answer {
        Answer {
            status: AnswerStatus::Resolved,
            issuer: Some(toyota()),
            periods: vec![PeriodKey::full_year(2024)],
            sections: contexts.iter().map(|c| c.section).collect(),
            contexts,
            candidates: Vec::new(),
            message: String::new(),
        }
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("あいうえお", 10), "あいうえお");
        assert_eq!(clip("あいうえお", 5), "あいうえお");
        assert_eq!(clip("あいうえお", 2), format!("あい\n{CLIP_MARKER}"));
    }

    #[test]
    fn test_render_resolved() {
        let answer = resolved(vec![
            context(SectionCode::RiskFactors, "為替変動リスク"),
            context(SectionCode::DividendPolicy, ""),
        ]);
        let rendered = render_context("トヨタのリスク", &answer, 100);
        assert!(rendered.contains("質問: トヨタのリスク"));
        assert!(rendered.contains("## 2024年度 (docID=S100AMND)"));
        assert!(rendered.contains("### 2-3 事業等のリスク [tag=BusinessRisksTextBlock]\n為替変動リスク"));
        assert!(rendered.contains("### 4-3 配当政策: 該当セクションなし"));
        assert!(rendered.contains("未取得セクション:\n- 2024年度 4-3 配当政策"));
        assert!(rendered.contains("回答ガイド:"));
        assert!(!rendered.contains("一般知識ベース"));
    }

    #[test]
    fn test_render_clips_long_sections() {
        let long = "あ".repeat(50);
        let answer = resolved(vec![context(SectionCode::RiskFactors, &long)]);
        let rendered = render_context("q", &answer, 10);
        assert!(rendered.contains(&format!("{}\n{}", "あ".repeat(10), CLIP_MARKER)));
    }

    #[test]
    fn test_render_without_text_warns() {
        let answer = resolved(vec![context(SectionCode::RiskFactors, "")]);
        let rendered = render_context("q", &answer, 10);
        assert!(rendered.contains("一般知識ベース"));
    }

    #[test]
    fn test_render_ambiguous() {
        let answer = Answer {
            status: AnswerStatus::Ambiguous,
            issuer: None,
            periods: Vec::new(),
            sections: Vec::new(),
            contexts: Vec::new(),
            candidates: vec![
                Issuer::new("E05999", "ホンダファイナンス株式会社"),
                Issuer::new("E02167", "本田技研工業株式会社"),
            ],
            message: "「ホンダ」に該当する企業が複数あります".to_string(),
        };
        let rendered = render_context("ホンダの2024年3月期", &answer, 10);
        assert!(rendered.contains("- ホンダファイナンス株式会社 (E05999)"));
        assert!(rendered.contains("EDINETコード"));
    }
}
