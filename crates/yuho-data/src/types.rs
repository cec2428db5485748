//! Core records shared by the resolver and the retrieval layer.

use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Fiscal year-end month assumed when the code list does not say.
///
/// March closers are the large majority of EDINET filers.
pub const DEFAULT_FISCAL_YEAR_END_MONTH: u32 = 3;

/// Days after a quarter close within which the quarterly report is due.
const QUARTERLY_DEADLINE_DAYS: i64 = 45;

/// Months after the fiscal year close within which the annual report is due.
const ANNUAL_DEADLINE_MONTHS: u32 = 3;

/// A registered issuer from the EDINET code list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issuer {
    /// EDINET filer code (`E` + 5 digits)
    pub filer_code: String,
    /// 4-digit securities code, for listed issuers
    pub securities_code: Option<String>,
    /// Registered name
    pub canonical_name: String,
    /// Other names the issuer is known by (English name, reading, overrides)
    pub name_aliases: BTreeSet<String>,
    /// Month in which the fiscal year closes (1-12)
    pub fiscal_year_end_month: Option<u32>,
}

impl Issuer {
    /// Create an issuer with no securities code, aliases or year-end month.
    pub fn new(filer_code: impl Into<String>, canonical_name: impl Into<String>) -> Self {
        Self {
            filer_code: filer_code.into(),
            securities_code: None,
            canonical_name: canonical_name.into(),
            name_aliases: BTreeSet::new(),
            fiscal_year_end_month: None,
        }
    }

    /// An issuer known only by its filer code.
    pub fn code_only(filer_code: impl Into<String>) -> Self {
        let code = filer_code.into();
        Self::new(code.clone(), code)
    }

    /// Set the securities code.
    pub fn with_securities_code(mut self, code: impl Into<String>) -> Self {
        self.securities_code = Some(code.into());
        self
    }

    /// Add an alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.name_aliases.insert(alias.into());
        self
    }

    /// Set the fiscal year-end month. Values outside 1-12 are ignored.
    pub fn with_fiscal_year_end_month(mut self, month: u32) -> Self {
        if (1..=12).contains(&month) {
            self.fiscal_year_end_month = Some(month);
        }
        self
    }

    /// Fiscal year-end month, falling back to March.
    pub fn year_end_month(&self) -> u32 {
        self.fiscal_year_end_month
            .unwrap_or(DEFAULT_FISCAL_YEAR_END_MONTH)
    }
}

impl fmt::Display for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.securities_code {
            Some(code) => write!(f, "{} ({}, {})", self.canonical_name, self.filer_code, code),
            None => write!(f, "{} ({})", self.canonical_name, self.filer_code),
        }
    }
}

/// Kind of reporting period.
///
/// Quarters sort before the full year of the same fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    /// Quarter 1-3 (the fourth quarter is reported as the full year)
    Quarter(u8),
    /// Full fiscal year
    FullYear,
}

/// Canonical fiscal-period identifier.
///
/// `fiscal_year` is the calendar year in which the fiscal year closes, so a
/// fiscal year running April 2023 to March 2024 is `2024`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    /// Fiscal year (year of the closing month)
    pub fiscal_year: i32,
    /// Full year or quarter
    pub kind: PeriodKind,
}

impl PeriodKey {
    /// Full fiscal year.
    pub const fn full_year(fiscal_year: i32) -> Self {
        Self {
            fiscal_year,
            kind: PeriodKind::FullYear,
        }
    }

    /// Quarter `n` of a fiscal year. Quarter 4 is the full year; anything
    /// outside 1-4 is rejected.
    pub const fn quarter(fiscal_year: i32, n: u8) -> Option<Self> {
        match n {
            1..=3 => Some(Self {
                fiscal_year,
                kind: PeriodKind::Quarter(n),
            }),
            4 => Some(Self::full_year(fiscal_year)),
            _ => None,
        }
    }

    /// Period closing in `year`/`month` for an issuer whose fiscal year
    /// closes in `fye_month`.
    ///
    /// A close in the year-end month is the full year. Otherwise the close is
    /// a quarter end counted in three-month steps from the previous year end;
    /// closes before the year-end month belong to the fiscal year closing the
    /// same calendar year, later ones to the following year. A close month
    /// that is not on a quarter boundary is read as a full year closing in
    /// that month (the issuer changed its year end).
    pub fn from_close(year: i32, month: u32, fye_month: u32) -> Self {
        if month == fye_month {
            return Self::full_year(year);
        }
        let since_close = (month + 12 - fye_month) % 12;
        if since_close % 3 != 0 {
            return Self::full_year(year);
        }
        let fiscal_year = if month < fye_month { year } else { year + 1 };
        // since_close is 3, 6 or 9 here
        Self::quarter(fiscal_year, (since_close / 3) as u8)
            .unwrap_or_else(|| Self::full_year(fiscal_year))
    }

    /// Whether this is a full-year period.
    pub const fn is_full_year(&self) -> bool {
        matches!(self.kind, PeriodKind::FullYear)
    }

    /// Short code used in cache keys and logs (`FY`, `Q1`..`Q3`).
    pub fn code(&self) -> String {
        match self.kind {
            PeriodKind::FullYear => "FY".to_string(),
            PeriodKind::Quarter(n) => format!("Q{n}"),
        }
    }

    /// Last calendar day of the period for an issuer closing in `fye_month`.
    pub fn period_end(&self, fye_month: u32) -> Option<NaiveDate> {
        let steps = match self.kind {
            PeriodKind::FullYear => 4,
            PeriodKind::Quarter(n) => i32::from(n),
        };
        // Months counted from year 0 at the previous fiscal close.
        let previous_close = (self.fiscal_year - 1) * 12 + (fye_month as i32 - 1);
        let close = previous_close + steps * 3;
        last_day_of_month(close.div_euclid(12), close.rem_euclid(12) as u32 + 1)
    }

    /// Statutory filing deadline: three months after a fiscal year close,
    /// 45 days after a quarter close.
    pub fn filing_deadline(&self, fye_month: u32) -> Option<NaiveDate> {
        let end = self.period_end(fye_month)?;
        match self.kind {
            PeriodKind::FullYear => end.checked_add_months(Months::new(ANNUAL_DEADLINE_MONTHS)),
            PeriodKind::Quarter(_) => end.checked_add_signed(TimeDelta::days(QUARTERLY_DEADLINE_DAYS)),
        }
    }

    /// Canonical Japanese rendering (`2024年度`, `2024年度第1四半期`).
    pub fn render(&self) -> String {
        match self.kind {
            PeriodKind::FullYear => format!("{}年度", self.fiscal_year),
            PeriodKind::Quarter(n) => format!("{}年度第{}四半期", self.fiscal_year, n),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// A downloaded filing.
///
/// For one issuer and period there may be an original and any number of
/// corrections; the fetcher only ever hands out the authoritative one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRecord {
    /// Filing issuer
    pub issuer: Issuer,
    /// Reporting period the filing covers
    pub period: PeriodKey,
    /// EDINET document id (`S100XXXX`)
    pub document_id: String,
    /// Whether this is an amended report
    pub is_correction: bool,
    /// Submission time as published by EDINET (JST)
    pub submitted_at: NaiveDateTime,
    /// XBRL instance document
    #[serde(skip)]
    pub raw_body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use rstest::rstest;

    #[test]
    fn test_period_ordering() {
        let q1 = PeriodKey::quarter(2024, 1).unwrap();
        let q3 = PeriodKey::quarter(2024, 3).unwrap();
        let fy = PeriodKey::full_year(2024);
        let next = PeriodKey::quarter(2025, 1).unwrap();

        assert!(q1 < q3);
        assert!(q3 < fy);
        assert!(fy < next);
    }

    #[test]
    fn test_fourth_quarter_is_full_year() {
        assert_eq!(PeriodKey::quarter(2024, 4), Some(PeriodKey::full_year(2024)));
        assert_eq!(PeriodKey::quarter(2024, 0), None);
        assert_eq!(PeriodKey::quarter(2024, 5), None);
    }

    #[rstest]
    #[case(2024, 3, 3, PeriodKey::full_year(2024))]
    #[case(2024, 6, 3, PeriodKey::quarter(2025, 1).unwrap())]
    #[case(2024, 12, 3, PeriodKey::quarter(2025, 3).unwrap())]
    #[case(2024, 3, 12, PeriodKey::quarter(2024, 1).unwrap())]
    #[case(2024, 9, 12, PeriodKey::quarter(2024, 3).unwrap())]
    #[case(2024, 12, 12, PeriodKey::full_year(2024))]
    #[case(2024, 5, 3, PeriodKey::full_year(2024))]
    fn test_from_close(
        #[case] year: i32,
        #[case] month: u32,
        #[case] fye: u32,
        #[case] expected: PeriodKey,
    ) {
        assert_eq!(PeriodKey::from_close(year, month, fye), expected);
    }

    #[rstest]
    #[case(PeriodKey::full_year(2024), 3, (2024, 3, 31))]
    #[case(PeriodKey::quarter(2025, 1).unwrap(), 3, (2024, 6, 30))]
    #[case(PeriodKey::quarter(2024, 2).unwrap(), 12, (2024, 6, 30))]
    #[case(PeriodKey::full_year(2024), 12, (2024, 12, 31))]
    #[case(PeriodKey::full_year(2024), 2, (2024, 2, 29))]
    fn test_period_end(#[case] key: PeriodKey, #[case] fye: u32, #[case] ymd: (i32, u32, u32)) {
        let expected = NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap();
        assert_eq!(key.period_end(fye), Some(expected));
    }

    #[test]
    fn test_period_end_round_trips_through_from_close() {
        for fye in 1..=12 {
            for key in [
                PeriodKey::full_year(2024),
                PeriodKey::quarter(2024, 1).unwrap(),
                PeriodKey::quarter(2024, 2).unwrap(),
                PeriodKey::quarter(2024, 3).unwrap(),
            ] {
                let end = key.period_end(fye).unwrap();
                assert_eq!(PeriodKey::from_close(end.year(), end.month(), fye), key);
            }
        }
    }

    #[test]
    fn test_filing_deadline() {
        let fy = PeriodKey::full_year(2024);
        assert_eq!(
            fy.filing_deadline(3),
            NaiveDate::from_ymd_opt(2024, 6, 30)
        );

        let q1 = PeriodKey::quarter(2025, 1).unwrap();
        assert_eq!(
            q1.filing_deadline(3),
            NaiveDate::from_ymd_opt(2024, 8, 14)
        );
    }

    #[test]
    fn test_render() {
        assert_eq!(PeriodKey::full_year(2024).render(), "2024年度");
        assert_eq!(
            PeriodKey::quarter(2024, 2).unwrap().render(),
            "2024年度第2四半期"
        );
        assert_eq!(PeriodKey::quarter(2024, 2).unwrap().code(), "Q2");
    }

    #[test]
    fn test_issuer_builder() {
        let issuer = Issuer::new("E02144", "トヨタ自動車株式会社")
            .with_securities_code("7203")
            .with_alias("トヨタ")
            .with_fiscal_year_end_month(3);

        assert_eq!(issuer.securities_code.as_deref(), Some("7203"));
        assert!(issuer.name_aliases.contains("トヨタ"));
        assert_eq!(issuer.year_end_month(), 3);
        assert_eq!(
            issuer.to_string(),
            "トヨタ自動車株式会社 (E02144, 7203)"
        );

        let bare = Issuer::code_only("E99999").with_fiscal_year_end_month(13);
        assert_eq!(bare.canonical_name, "E99999");
        assert_eq!(bare.fiscal_year_end_month, None);
        assert_eq!(bare.year_end_month(), DEFAULT_FISCAL_YEAR_END_MONTH);
    }
}
