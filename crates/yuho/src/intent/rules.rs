//! Rule-based extraction of company mentions from a question.

use crate::directory::{is_filer_code, is_securities_code};
use crate::period::PeriodParser;
use crate::sections::SectionVocabulary;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use yuho_data::text::fold;

/// Phrases that ask for the cache to be bypassed.
const REFRESH_TOKENS: [&str; 3] = ["再取得", "再実行", "retry"];

const SECURITIES_LABEL_PATTERN: &str = r"証券コード\s*:?\s*([0-9]{4})";

const COMPANY_SUFFIX_PATTERN: &str = r"[\p{Han}\p{Katakana}ーA-Za-z0-9・&\-]+?(?:株式会社|ホールディングス|グループ|HD|自動車|銀行|工業|製作所|商事|電機|社)";

const PARTICLE_PATTERN: &str = r"(?i)[\s、,。!?()\[\]「」『』【】:;/]+|について|および|及び|ならびに|vs|と|の|を|は|が|に|で|へ|も";

const TRAILING_NOISE_PATTERN: &str = r"(事業|リスク|比較|分析|業績|強み|弱み|課題|概要|状況).*$";

/// Spans never taken for a company name.
const STOPWORDS: &[&str] = &[
    "有価証券報告書",
    "有報",
    "四半期報告書",
    "edinet",
    "api",
    "xbrl",
    "会社",
    "企業",
    "質問",
    "教えて",
    "調べて",
    "見て",
    "して",
    "ください",
    "知りたい",
    "まとめて",
    "要約",
    "内容",
    "情報",
    "違い",
    "比べて",
];

const MAX_MENTION_CHARS: usize = 80;

/// Whether `text` asks for a refresh.
pub(crate) fn wants_refresh(text: &str) -> bool {
    let folded = fold(text);
    REFRESH_TOKENS.iter().any(|token| folded.contains(token))
}

/// Candidate company mentions, strongest evidence first.
#[derive(Debug, Clone)]
pub(crate) struct MentionExtractor {
    refresh: Regex,
    securities_label: Regex,
    company_suffix: Regex,
    particles: Regex,
    trailing_noise: Regex,
    stopwords: Regex,
}

impl MentionExtractor {
    pub(crate) fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            refresh: alternation(&REFRESH_TOKENS)?,
            securities_label: Regex::new(SECURITIES_LABEL_PATTERN)?,
            company_suffix: Regex::new(COMPANY_SUFFIX_PATTERN)?,
            particles: Regex::new(PARTICLE_PATTERN)?,
            trailing_noise: Regex::new(TRAILING_NOISE_PATTERN)?,
            stopwords: stopword_pattern()?,
        })
    }

    /// Mentions in `text`, in tier order: filer codes, labelled securities
    /// codes, other 4-digit codes, company-suffix spans, then the remaining
    /// particle-delimited spans once period, refresh and section phrases are
    /// removed.
    pub(crate) fn mentions(
        &self,
        text: &str,
        periods: &PeriodParser,
        vocabulary: &SectionVocabulary,
    ) -> Vec<String> {
        let normalized: String = text.nfkc().collect();
        let mut found = Vec::new();

        for run in normalized.split(|c: char| !c.is_ascii_alphanumeric()) {
            if is_filer_code(run) {
                found.push(run.to_ascii_uppercase());
            }
        }

        for caps in self.securities_label.captures_iter(&normalized) {
            if let Some(code) = caps.get(1) {
                found.push(code.as_str().to_string());
            }
        }
        found.extend(code_runs(&normalized).map(str::to_string));

        for span in self.company_suffix.find_iter(&normalized) {
            if let Some(token) = clean(span.as_str()) {
                found.push(token);
            }
        }

        let stripped = vocabulary.strip(&periods.strip(&normalized));
        let stripped = self.refresh.replace_all(&stripped, " ");
        let stripped = self.stopwords.replace_all(&stripped, " ");
        for part in self.particles.split(&stripped) {
            let part = self.trailing_noise.replace(part, "");
            if let Some(token) = clean(&part) {
                found.push(token);
            }
        }

        let mut unique = Vec::with_capacity(found.len());
        for token in found {
            if !unique.contains(&token) {
                unique.push(token);
            }
        }
        unique
    }
}

/// Alternation of the stopwords, longest first.
fn stopword_pattern() -> Result<Regex, regex::Error> {
    alternation(STOPWORDS)
}

/// Case-insensitive alternation of literal `words`, longest first.
fn alternation(words: &[&str]) -> Result<Regex, regex::Error> {
    let mut words = words.to_vec();
    words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    let pattern = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){pattern}"))
}

/// 4-digit runs that are not part of a date.
fn code_runs(text: &str) -> impl Iterator<Item = &str> {
    let mut runs = Vec::new();
    let mut start = None;
    for (idx, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (c.is_ascii_digit(), start) {
            (true, None) => start = Some(idx),
            (false, Some(begin)) => {
                runs.push((begin, idx));
                start = None;
            }
            _ => {}
        }
    }

    runs.into_iter().filter_map(move |(begin, end)| {
        let run = &text[begin..end];
        let before = text[..begin].chars().next_back();
        let after = text[end..].chars().next();
        let dated_before = before.is_some_and(|c| matches!(c, '/' | '-' | '.') || c.is_ascii_alphabetic());
        let dated_after = after
            .is_some_and(|c| matches!(c, '年' | '月' | '期' | '度' | '/' | '-' | '.') || c.is_ascii_alphabetic());
        (is_securities_code(run) && !dated_before && !dated_after).then_some(run)
    })
}

fn clean(span: &str) -> Option<String> {
    let trimmed = span
        .trim()
        .trim_matches(|c: char| "。.!?()（）[]「」『』\"'".contains(c))
        .trim();
    let chars = trimmed.chars().count();
    if chars <= 1 || chars > MAX_MENTION_CHARS {
        return None;
    }
    let folded = fold(trimmed);
    if STOPWORDS.iter().any(|w| fold(w) == folded) {
        return None;
    }
    Some(trimmed.to_string())
}
