//! Fiscal-period expression parsing.
//!
//! Recognized shapes, after NFKC normalization:
//!
//! | expression | period |
//! |---|---|
//! | `2024年度`, `FY2024` | full year 2024 |
//! | `2024年度第1四半期`, `2024年度Q1`, `FY2024Q1` | first quarter of 2024 |
//! | `2024年3月期`, `2024/3期`, `2024-03期`, `2024.3期` | period closing March 2024 |
//!
//! Several expressions in one text (`2023年度と2024年度`, `FY2023 vs FY2024`)
//! yield several periods.

use regex::{Captures, Regex};
use std::collections::BTreeSet;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use yuho_data::PeriodKey;

const MIN_YEAR: i32 = 1990;
const MAX_YEAR: i32 = 2100;

const PERIOD_PATTERN: &str = r"(?xi)
    (?P<qy>[0-9]{4})\s*年度\s*(?:第\s*(?P<qn>[1-4])\s*四半期|q\s*(?P<qn2>[1-4]))
  | fy\s*(?P<fqy>[0-9]{4})\s*q\s*(?P<fqn>[1-4])
  | (?P<cy>[0-9]{4})\s*(?:年|/|-|\.)\s*(?P<cm>[0-9]{1,2})\s*月?\s*期
  | (?P<fy>[0-9]{4})\s*年度
  | fy\s*(?P<fy2>[0-9]{4})
";

/// Period parsing errors.
#[derive(Debug, Error)]
pub enum PeriodError {
    /// No period expression in the text
    #[error("No fiscal period found in {0:?}")]
    NoPeriod(String),

    /// The period pattern failed to compile
    #[error("Invalid period pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Parser for fiscal-period expressions.
#[derive(Debug, Clone)]
pub struct PeriodParser {
    pattern: Regex,
}

impl PeriodParser {
    /// Compile the parser.
    pub fn new() -> Result<Self, PeriodError> {
        Ok(Self {
            pattern: Regex::new(PERIOD_PATTERN)?,
        })
    }

    /// Parse without knowing the issuer's fiscal year end.
    ///
    /// Close-month expressions (`2024年3月期`) are read as full years closing
    /// in that month.
    pub fn parse(&self, expression: &str) -> Result<BTreeSet<PeriodKey>, PeriodError> {
        self.collect(expression, None)
    }

    /// Parse for an issuer whose fiscal year closes in `fye_month`.
    pub fn parse_for(
        &self,
        expression: &str,
        fye_month: u32,
    ) -> Result<BTreeSet<PeriodKey>, PeriodError> {
        self.collect(expression, Some(fye_month))
    }

    fn collect(
        &self,
        expression: &str,
        fye_month: Option<u32>,
    ) -> Result<BTreeSet<PeriodKey>, PeriodError> {
        let normalized: String = expression.nfkc().collect();
        let periods: BTreeSet<PeriodKey> = self
            .pattern
            .captures_iter(&normalized)
            .filter_map(|caps| period_from(&caps, fye_month))
            .collect();
        if periods.is_empty() {
            return Err(PeriodError::NoPeriod(expression.to_string()));
        }
        Ok(periods)
    }

    /// Whether `text` contains a period expression.
    pub fn contains_period(&self, text: &str) -> bool {
        let normalized: String = text.nfkc().collect();
        self.pattern.is_match(&normalized)
    }

    /// NFKC-normalize `text` and replace period expressions with a space.
    pub fn strip(&self, text: &str) -> String {
        let normalized: String = text.nfkc().collect();
        self.pattern.replace_all(&normalized, " ").into_owned()
    }
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn valid_year(year: i32) -> Option<i32> {
    (MIN_YEAR..=MAX_YEAR).contains(&year).then_some(year)
}

fn period_from(caps: &Captures<'_>, fye_month: Option<u32>) -> Option<PeriodKey> {
    if let Some(year) = number::<i32>(caps, "qy").or_else(|| number(caps, "fqy")) {
        let n = number::<u8>(caps, "qn")
            .or_else(|| number(caps, "qn2"))
            .or_else(|| number(caps, "fqn"))?;
        return PeriodKey::quarter(valid_year(year)?, n);
    }
    if let Some(year) = number::<i32>(caps, "cy") {
        let month = number::<u32>(caps, "cm").filter(|m| (1..=12).contains(m))?;
        let fye_month = fye_month.unwrap_or(month);
        // A close that is no quarter end of this issuer names no period of it.
        if (month + 12 - fye_month) % 3 != 0 {
            return None;
        }
        return Some(PeriodKey::from_close(valid_year(year)?, month, fye_month));
    }
    let year = number::<i32>(caps, "fy").or_else(|| number(caps, "fy2"))?;
    Some(PeriodKey::full_year(valid_year(year)?))
}

/// Canonical expression for a period; parses back to the same key.
pub fn render(period: &PeriodKey) -> String {
    period.render()
}

/// Canonical expression for a set of periods joined with `と`.
pub fn render_all<'a>(periods: impl IntoIterator<Item = &'a PeriodKey>) -> String {
    periods
        .into_iter()
        .map(render)
        .collect::<Vec<_>>()
        .join("と")
}
