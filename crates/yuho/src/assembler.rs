//! Extraction contexts from fetched filings.

use crate::intent::ResolvedQuery;
use crate::sections::SectionCode;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use yuho_data::{FilingRecord, Issuer, PeriodKey, XbrlDocument};

/// Context assembly errors.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// A requested period has no filing
    #[error("No filing supplied for {0}")]
    MissingFiling(PeriodKey),

    /// A filing body is not a readable XBRL instance
    #[error("Filing {document_id} could not be read: {reason}")]
    MalformedFiling {
        /// Document id of the filing
        document_id: String,
        /// Parser message
        reason: String,
    },
}

/// Text of one section of one period's filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionContext {
    /// Filing issuer
    pub issuer: Issuer,
    /// Reporting period
    pub period: PeriodKey,
    /// Requested section
    pub section: SectionCode,
    /// Plain text of the section, empty when missing
    pub text: String,
    /// Document the text was taken from
    pub source_document_id: String,
    /// Whether the filing lacks the section
    pub section_missing: bool,
    /// XBRL element the text came from
    pub source_tag: Option<String>,
}

/// Assembles extraction contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    /// Create an assembler.
    pub const fn new() -> Self {
        Self
    }

    /// One context per requested period and section: periods ascending,
    /// sections in the order asked. Each filing is parsed once.
    pub fn assemble(
        &self,
        query: &ResolvedQuery,
        filings: &BTreeMap<PeriodKey, FilingRecord>,
    ) -> Result<Vec<ExtractionContext>, AssembleError> {
        let mut contexts = Vec::with_capacity(query.periods.len() * query.sections.len());
        for period in &query.periods {
            let filing = filings
                .get(period)
                .ok_or(AssembleError::MissingFiling(*period))?;
            let document =
                XbrlDocument::parse(&filing.raw_body).map_err(|e| AssembleError::MalformedFiling {
                    document_id: filing.document_id.clone(),
                    reason: e.to_string(),
                })?;

            for section in &query.sections {
                let found = document.first_available(section.tags());
                if found.is_none() {
                    log::debug!(
                        "{} has no {} ({})",
                        filing.document_id,
                        section.id(),
                        section.title()
                    );
                }
                contexts.push(ExtractionContext {
                    issuer: query.issuer.clone(),
                    period: *period,
                    section: *section,
                    text: found.map(|(_, text)| text.to_string()).unwrap_or_default(),
                    source_document_id: filing.document_id.clone(),
                    section_missing: found.is_none(),
                    source_tag: found.map(|(tag, _)| tag.to_string()),
                });
            }
        }
        Ok(contexts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::InterpretationSource;
    use chrono::NaiveDate;

    fn filing(period: PeriodKey, document_id: &str, body: &str) -> FilingRecord {
        FilingRecord {
            issuer: Issuer::new("E02144", "トヨタ自動車株式会社"),
            period,
            document_id: document_id.to_string(),
            is_correction: false,
            submitted_at: NaiveDate::from_ymd_opt(2024, 6, 28)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
            raw_body: body.as_bytes().to_vec(),
        }
    }

    fn instance(blocks: &[(&str, &str)]) -> String {
        let mut xml = String::from(r#"<xbrli:xbrl xmlns:xbrli="urn:x" xmlns:jpcrp_cor="urn:j">"#);
        for (tag, text) in blocks {
            xml.push_str(&format!("<jpcrp_cor:{tag}>&lt;p&gt;{text}&lt;/p&gt;</jpcrp_cor:{tag}>"));
        }
        xml.push_str("</xbrli:xbrl>");
        xml
    }

    fn query(periods: &[PeriodKey], sections: &[SectionCode]) -> ResolvedQuery {
        ResolvedQuery {
            issuer: Issuer::new("E02144", "トヨタ自動車株式会社"),
            periods: periods.iter().copied().collect(),
            sections: sections.to_vec(),
            force_refresh: false,
            source: InterpretationSource::Rules,
        }
    }

    #[test]
    fn test_order_is_period_then_section() {
        let (fy23, fy24) = (PeriodKey::full_year(2023), PeriodKey::full_year(2024));
        let filings = BTreeMap::from([
            (
                fy24,
                filing(fy24, "S100B", &instance(&[("BusinessRisksTextBlock", "為替"), ("DividendPolicyTextBlock", "増配")])),
            ),
            (
                fy23,
                filing(fy23, "S100A", &instance(&[("DividendPolicyTextBlock", "安定配当")])),
            ),
        ]);
        let contexts = ContextAssembler::new()
            .assemble(
                &query(&[fy24, fy23], &[SectionCode::DividendPolicy, SectionCode::RiskFactors]),
                &filings,
            )
            .unwrap();

        let order: Vec<_> = contexts
            .iter()
            .map(|c| (c.period.fiscal_year, c.section))
            .collect();
        assert_eq!(
            order,
            vec![
                (2023, SectionCode::DividendPolicy),
                (2023, SectionCode::RiskFactors),
                (2024, SectionCode::DividendPolicy),
                (2024, SectionCode::RiskFactors),
            ]
        );
        assert_eq!(contexts[0].text, "安定配当");
        assert_eq!(contexts[0].source_document_id, "S100A");
        assert_eq!(contexts[0].source_tag.as_deref(), Some("DividendPolicyTextBlock"));
        assert!(contexts[1].section_missing);
        assert!(contexts[1].text.is_empty());
        assert_eq!(contexts[3].text, "為替");
    }

    #[test]
    fn test_alternate_tag_is_used() {
        let fy = PeriodKey::full_year(2024);
        let body = instance(&[("MaterialMattersRelatingToGoingConcernEtcBusinessRisksTextBlock", "継続企業")]);
        let filings = BTreeMap::from([(fy, filing(fy, "S100C", &body))]);
        let contexts = ContextAssembler::new()
            .assemble(&query(&[fy], &[SectionCode::RiskFactors]), &filings)
            .unwrap();
        assert!(!contexts[0].section_missing);
        assert_eq!(contexts[0].text, "継続企業");
    }

    #[test]
    fn test_missing_filing() {
        let fy = PeriodKey::full_year(2024);
        let result = ContextAssembler::new().assemble(&query(&[fy], &[SectionCode::RiskFactors]), &BTreeMap::new());
        assert!(matches!(result, Err(AssembleError::MissingFiling(p)) if p == fy));
    }

    #[test]
    fn test_malformed_filing() {
        let fy = PeriodKey::full_year(2024);
        let filings = BTreeMap::from([(fy, filing(fy, "S100D", "<a><b></a>"))]);
        let result = ContextAssembler::new().assemble(&query(&[fy], &[SectionCode::RiskFactors]), &filings);
        assert!(matches!(result, Err(AssembleError::MalformedFiling { document_id, .. }) if document_id == "S100D"));
    }
}
