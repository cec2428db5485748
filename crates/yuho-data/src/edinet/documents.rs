//! EDINET document listings.
//!
//! The `documents.json` endpoint lists every submission received on one
//! calendar day. This module models that payload and narrows it down to the
//! periodic reports the resolver cares about.

use crate::error::{DataError, Result};
use crate::types::PeriodKey;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Deserialize;

/// Periodic report document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocType {
    /// 有価証券報告書
    AnnualReport,
    /// 訂正有価証券報告書
    AmendedAnnualReport,
    /// 四半期報告書
    QuarterlyReport,
    /// 訂正四半期報告書
    AmendedQuarterlyReport,
}

impl DocType {
    /// Parse an EDINET `docTypeCode`. Other document types are `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "120" => Some(Self::AnnualReport),
            "130" => Some(Self::AmendedAnnualReport),
            "140" => Some(Self::QuarterlyReport),
            "150" => Some(Self::AmendedQuarterlyReport),
            _ => None,
        }
    }

    /// EDINET `docTypeCode`.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AnnualReport => "120",
            Self::AmendedAnnualReport => "130",
            Self::QuarterlyReport => "140",
            Self::AmendedQuarterlyReport => "150",
        }
    }

    /// Whether this is an amendment of an earlier submission.
    pub const fn is_correction(&self) -> bool {
        matches!(
            self,
            Self::AmendedAnnualReport | Self::AmendedQuarterlyReport
        )
    }

    /// Whether this document covers a full fiscal year.
    pub const fn is_annual(&self) -> bool {
        matches!(self, Self::AnnualReport | Self::AmendedAnnualReport)
    }
}

/// Raw `documents.json` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentList {
    /// Response metadata
    #[serde(default)]
    pub metadata: Option<ListMetadata>,
    /// Submissions of the day (absent on API errors)
    #[serde(default)]
    pub results: Option<Vec<DocumentEntry>>,
}

/// Listing metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ListMetadata {
    /// Status code as a string (`"200"` on success)
    #[serde(default)]
    pub status: Option<String>,
    /// Status message
    #[serde(default)]
    pub message: Option<String>,
}

/// One submission in a listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    /// Document id
    #[serde(rename = "docID")]
    pub doc_id: String,
    /// Filer code
    #[serde(default)]
    pub edinet_code: Option<String>,
    /// 5-digit securities code
    #[serde(default)]
    pub sec_code: Option<String>,
    /// Filer name
    #[serde(default)]
    pub filer_name: Option<String>,
    /// Document type code
    #[serde(default)]
    pub doc_type_code: Option<String>,
    /// Period start (`YYYY-MM-DD`)
    #[serde(default)]
    pub period_start: Option<String>,
    /// Period end (`YYYY-MM-DD`)
    #[serde(default)]
    pub period_end: Option<String>,
    /// Submission time (`YYYY-MM-DD HH:MM`, JST)
    #[serde(default)]
    pub submit_date_time: Option<String>,
    /// Document amended by this one
    #[serde(rename = "parentDocID", default)]
    pub parent_doc_id: Option<String>,
    /// `"0"` unless the document was withdrawn
    #[serde(default)]
    pub withdrawal_status: Option<String>,
    /// `"1"` when an XBRL instance is available
    #[serde(default)]
    pub xbrl_flag: Option<String>,
}

impl DocumentList {
    /// Parse a listing payload.
    pub fn parse_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DataError::EdinetApi(format!("Failed to parse document list: {}", e)))
    }

    /// Submissions of the day, or the API's own error when it sent none.
    pub fn into_entries(self) -> Result<Vec<DocumentEntry>> {
        if let Some(results) = self.results {
            return Ok(results);
        }
        let (status, message) = self
            .metadata
            .map(|m| (m.status.unwrap_or_default(), m.message.unwrap_or_default()))
            .unwrap_or_default();
        match status.parse::<u16>() {
            Ok(code) if code >= 400 => Err(DataError::Status {
                status: code,
                endpoint: format!("documents.json ({message})"),
            }),
            _ => Err(DataError::EdinetApi(format!(
                "document list without results (status {status:?}, message {message:?})"
            ))),
        }
    }
}

/// A periodic report narrowed out of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingSummary {
    /// Document id
    pub document_id: String,
    /// Filer code
    pub filer_code: String,
    /// Filer name as submitted
    pub filer_name: String,
    /// Report type
    pub doc_type: DocType,
    /// Reported period start
    pub period_start: Option<NaiveDate>,
    /// Reported period end
    pub period_end: Option<NaiveDate>,
    /// Submission time (JST)
    pub submitted_at: NaiveDateTime,
    /// Document this one amends
    pub parent_document_id: Option<String>,
    /// Whether the submission was withdrawn
    pub withdrawn: bool,
    /// Whether an XBRL instance can be downloaded
    pub has_xbrl: bool,
}

impl DocumentEntry {
    /// Narrow this entry to a periodic report.
    ///
    /// Returns `None` for other document types and for entries without a
    /// filer code or a readable submission time.
    pub fn to_summary(&self) -> Option<FilingSummary> {
        let doc_type = DocType::from_code(self.doc_type_code.as_deref()?)?;
        let filer_code = self.edinet_code.as_deref()?.trim();
        if filer_code.is_empty() {
            return None;
        }
        let submitted_at = parse_submitted_at(self.submit_date_time.as_deref()?)?;

        Some(FilingSummary {
            document_id: self.doc_id.clone(),
            filer_code: filer_code.to_string(),
            filer_name: self.filer_name.clone().unwrap_or_default(),
            doc_type,
            period_start: self.period_start.as_deref().and_then(parse_date),
            period_end: self.period_end.as_deref().and_then(parse_date),
            submitted_at,
            parent_document_id: self.parent_doc_id.clone(),
            withdrawn: self.withdrawal_status.as_deref().is_some_and(|s| s != "0"),
            has_xbrl: self.xbrl_flag.as_deref() == Some("1"),
        })
    }
}

impl FilingSummary {
    /// Period this report covers for an issuer closing in `fye_month`.
    ///
    /// Annual reports cover the fiscal year closing at their period end.
    /// Quarterly reports are converted through their close month and must
    /// land on a quarter.
    pub fn period_key(&self, fye_month: u32) -> Option<PeriodKey> {
        let end = self.period_end?;
        if self.doc_type.is_annual() {
            return Some(PeriodKey::full_year(end.year()));
        }
        let key = PeriodKey::from_close(end.year(), end.month(), fye_month);
        (!key.is_full_year()).then_some(key)
    }

    /// Whether the report can be used at all.
    pub const fn is_usable(&self) -> bool {
        !self.withdrawn && self.has_xbrl
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Parse an EDINET submission timestamp.
pub fn parse_submitted_at(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "metadata": {"status": "200", "message": "OK", "resultset": {"count": 3}},
        "results": [
            {
                "seqNumber": 1,
                "docID": "S100TR7I",
                "edinetCode": "E02144",
                "secCode": "72030",
                "filerName": "トヨタ自動車株式会社",
                "docTypeCode": "120",
                "periodStart": "2023-04-01",
                "periodEnd": "2024-03-31",
                "submitDateTime": "2024-06-18 15:00",
                "parentDocID": null,
                "withdrawalStatus": "0",
                "xbrlFlag": "1"
            },
            {
                "seqNumber": 2,
                "docID": "S100ABCD",
                "edinetCode": "E02144",
                "docTypeCode": "350",
                "submitDateTime": "2024-06-18 15:10",
                "withdrawalStatus": "0",
                "xbrlFlag": "0"
            },
            {
                "seqNumber": 3,
                "docID": "S100Q1XX",
                "edinetCode": "E02144",
                "docTypeCode": "140",
                "periodStart": "2024-04-01",
                "periodEnd": "2024-06-30",
                "submitDateTime": "2024-08-01 13:30",
                "withdrawalStatus": "0",
                "xbrlFlag": "1"
            }
        ]
    }"#;

    #[test]
    fn test_parse_listing() {
        let entries = DocumentList::parse_json(LISTING)
            .unwrap()
            .into_entries()
            .unwrap();
        assert_eq!(entries.len(), 3);

        let summaries: Vec<FilingSummary> =
            entries.iter().filter_map(DocumentEntry::to_summary).collect();
        assert_eq!(summaries.len(), 2);

        let annual = &summaries[0];
        assert_eq!(annual.document_id, "S100TR7I");
        assert_eq!(annual.doc_type, DocType::AnnualReport);
        assert!(annual.is_usable());
        assert_eq!(annual.period_key(3), Some(PeriodKey::full_year(2024)));

        let quarterly = &summaries[1];
        assert_eq!(
            quarterly.period_key(3),
            Some(PeriodKey::quarter(2025, 1).unwrap())
        );
    }

    #[test]
    fn test_listing_error_payload() {
        let payload = r#"{"metadata": {"status": "401", "message": "Access denied"}}"#;
        let err = DocumentList::parse_json(payload)
            .unwrap()
            .into_entries()
            .unwrap_err();
        assert!(matches!(err, DataError::Status { status: 401, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_withdrawn_entry_is_not_usable() {
        let entry = DocumentEntry {
            doc_id: "S100WD00".to_string(),
            edinet_code: Some("E02144".to_string()),
            sec_code: None,
            filer_name: None,
            doc_type_code: Some("130".to_string()),
            period_start: None,
            period_end: Some("2024-03-31".to_string()),
            submit_date_time: Some("2024-09-15 09:00".to_string()),
            parent_doc_id: Some("S100TR7I".to_string()),
            withdrawal_status: Some("1".to_string()),
            xbrl_flag: Some("1".to_string()),
        };
        let summary = entry.to_summary().unwrap();
        assert!(summary.doc_type.is_correction());
        assert!(!summary.is_usable());
    }

    #[test]
    fn test_submitted_at_formats() {
        assert!(parse_submitted_at("2024-06-28 15:00").is_some());
        assert!(parse_submitted_at("2024-06-28 15:00:30").is_some());
        assert!(parse_submitted_at("2024/06/28").is_none());
    }
}
