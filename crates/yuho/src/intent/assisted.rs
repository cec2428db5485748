//! Language-model assisted interpretation.

use super::completion::{TextCompletion, Turn};
use crate::directory::Candidate;
use crate::sections::SectionVocabulary;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Directory candidates offered to the model per mention.
pub(crate) const CANDIDATES_PER_MENTION: usize = 5;

/// What the model read out of the question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct Interpretation {
    #[serde(default)]
    pub(crate) company: Option<String>,
    #[serde(default)]
    pub(crate) periods: Vec<String>,
    #[serde(default)]
    pub(crate) sections: Vec<String>,
}

/// Build the interpretation prompt.
pub(crate) fn build_prompt(
    question: &str,
    recent_user: &[&str],
    vocabulary: &SectionVocabulary,
    candidates: &[Candidate],
) -> String {
    let sections: Vec<Value> = vocabulary
        .all()
        .iter()
        .map(|def| json!({"id": def.id, "title": def.title, "aliases": def.aliases}))
        .collect();
    let companies: Vec<Value> = candidates
        .iter()
        .map(|c| {
            json!({
                "filer_code": c.issuer.filer_code,
                "securities_code": c.issuer.securities_code,
                "name": c.issuer.canonical_name,
            })
        })
        .collect();

    let mut prompt = String::from(
        "あなたは有価証券報告書QAの意図解析器です。\
         質問文を読み、対象企業・決算期・参照セクションをJSONで抽出してください。\
         説明文は不要で、JSONオブジェクトのみを返してください。\n",
    );
    prompt.push_str("出力スキーマ:\n");
    prompt.push_str(
        "{\"company\": string | null, \"periods\": string[], \"sections\": string[]}\n",
    );
    prompt.push_str("注意:\n");
    prompt.push_str("- company は企業候補の filer_code を優先して返す\n");
    prompt.push_str("- periods は「2024年3月期」「2024年度」「2024年度第1四半期」の形式で、比較に必要な期を過不足なく返す\n");
    prompt.push_str("- sections は section id か title を返す\n");
    prompt.push_str("- 企業が推定不能なら company は null\n");
    prompt.push_str(&format!(
        "会話履歴(直近ユーザー発話): {}\n",
        Value::from(recent_user.to_vec())
    ));
    prompt.push_str(&format!("企業候補: {}\n", Value::from(companies)));
    prompt.push_str(&format!("セクション候補: {}\n", Value::from(sections)));
    prompt.push_str(&format!("ユーザー質問: {question}"));
    prompt
}

/// Extract the interpretation object from a model reply.
///
/// The reply may wrap the object in prose or a code fence; the outermost
/// `{...}` span is tried when the whole reply is not JSON.
pub(crate) fn parse_reply(reply: &str) -> Option<Interpretation> {
    let raw = reply.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = serde_json::from_str(raw) {
        return Some(parsed);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

/// Ask `completion` for an interpretation within `timeout`.
///
/// Every failure is logged at debug level and yields `None`.
pub(crate) async fn interpret(
    completion: &dyn TextCompletion,
    prompt: &str,
    context: &[Turn],
    timeout: Duration,
) -> Option<Interpretation> {
    let reply = match tokio::time::timeout(timeout, completion.complete(prompt, context)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            log::debug!("Assisted interpretation failed: {}", e);
            return None;
        }
        Err(_) => {
            log::debug!("Assisted interpretation timed out after {:?}", timeout);
            return None;
        }
    };
    let parsed = parse_reply(&reply);
    if parsed.is_none() {
        log::debug!("Assisted interpretation returned no JSON object");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"company": "E02144", "periods": ["2024年3月期"], "sections": ["2-3"]}"#)]
    #[case("```json\n{\"company\": \"E02144\", \"periods\": [\"2024年3月期\"], \"sections\": [\"2-3\"]}\n```")]
    #[case("回答です: {\"company\": \"E02144\", \"periods\": [\"2024年3月期\"], \"sections\": [\"2-3\"]} 以上")]
    fn test_parse_reply(#[case] reply: &str) {
        let parsed = parse_reply(reply).unwrap();
        assert_eq!(parsed.company.as_deref(), Some("E02144"));
        assert_eq!(parsed.periods, vec!["2024年3月期".to_string()]);
        assert_eq!(parsed.sections, vec!["2-3".to_string()]);
    }

    #[rstest]
    #[case("")]
    #[case("わかりません")]
    #[case("} {")]
    #[case("[1, 2]")]
    fn test_parse_reply_rejects(#[case] reply: &str) {
        assert!(parse_reply(reply).is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let parsed = parse_reply(r#"{"company": null}"#).unwrap();
        assert_eq!(parsed, Interpretation::default());
    }

    #[test]
    fn test_prompt_lists_vocabulary_and_question() {
        let prompt = build_prompt(
            "トヨタのリスク",
            &["前の質問"],
            &SectionVocabulary::standard(),
            &[],
        );
        assert!(prompt.contains("事業等のリスク"));
        assert!(prompt.contains("前の質問"));
        assert!(prompt.ends_with("ユーザー質問: トヨタのリスク"));
    }
}
