//! Remote filings registry abstraction.

use crate::edinet::FilingSummary;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// A remote source of periodic reports.
///
/// [`EdinetClient`](crate::edinet::EdinetClient) talks to the EDINET API;
/// tests substitute in-memory registries.
#[async_trait]
pub trait FilingRegistry: Send + Sync {
    /// Periodic reports submitted by `filer_code` between `from` and `to`,
    /// both inclusive.
    async fn list_filings(
        &self,
        filer_code: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FilingSummary>>;

    /// Drop listings memoized for submission dates in `from..=to`, so the
    /// next [`list_filings`](Self::list_filings) asks the source again.
    async fn forget_listings(&self, _from: NaiveDate, _to: NaiveDate) {}

    /// XBRL instance document of a submission.
    async fn download(&self, document_id: &str) -> Result<Vec<u8>>;
}
