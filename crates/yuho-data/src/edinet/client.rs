//! EDINET API v2 client with rate limiting.

use super::codelist::CodeList;
use super::documents::{DocumentEntry, DocumentList, FilingSummary};
use crate::error::{DataError, Result};
use crate::registry::FilingRegistry;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// EDINET API base URL
const EDINET_BASE_URL: &str = "https://api.edinet-fsa.go.jp/api/v2";

/// EDINET code list archive
const CODE_LIST_URL: &str =
    "https://disclosure2dl.edinet-fsa.go.jp/searchdocument/codelist/Edinetcode.zip";

/// Default spacing between requests
const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

/// Daily listings requested at once while scanning a window
const LISTING_CONCURRENCY: usize = 4;

/// Wait applied to a 429 answer without a usable Retry-After header
const DEFAULT_RETRY_AFTER_MS: u64 = 1_000;

const USER_AGENT: &str = concat!("yuho/", env!("CARGO_PKG_VERSION"));

/// Rate limiter to keep request spacing polite
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// EDINET API client with rate limiting.
///
/// Daily listings are memoized, so scanning overlapping windows for several
/// periods costs one request per day. A forced refresh drops the memoized
/// days of its window through [`FilingRegistry::forget_listings`].
pub struct EdinetClient {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    base_url: String,
    api_key: Option<String>,
    listings: Mutex<HashMap<NaiveDate, Arc<Vec<FilingSummary>>>>,
}

impl EdinetClient {
    /// Create a client with default settings.
    ///
    /// A missing `api_key` is not an error here; every registry call will
    /// fail with `DataError::MissingCredential` instead.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_rate_limit(api_key, DEFAULT_RATE_LIMIT)
    }

    /// Create a client with a custom minimum interval between requests.
    pub fn with_rate_limit(api_key: Option<String>, min_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(DataError::Network)?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(min_interval))),
            base_url: EDINET_BASE_URL.to_string(),
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            listings: Mutex::new(HashMap::new()),
        })
    }

    /// Point the client at another API root (mirrors, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether a credential is configured.
    pub const fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(DataError::MissingCredential)
    }

    /// Periodic reports submitted on one day.
    ///
    /// # Errors
    /// `MissingCredential` without an API key; `Status`/`RateLimit` for
    /// non-success answers; `EdinetApi` for unreadable payloads.
    pub async fn list_documents(&self, date: NaiveDate) -> Result<Arc<Vec<FilingSummary>>> {
        let key = self.api_key()?;
        if let Some(hit) = self.listings.lock().await.get(&date) {
            return Ok(Arc::clone(hit));
        }

        self.rate_limiter.lock().await.wait().await;

        let endpoint = format!("documents.json?date={date}");
        let url = format!(
            "{}/documents.json?date={}&type=2&Subscription-Key={}",
            self.base_url, date, key
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(DataError::Network)?;
        let response = check_status(response, &endpoint)?;

        let body = response
            .text()
            .await
            .map_err(|e| DataError::EdinetApi(format!("Failed to read document list: {}", e)))?;
        let summaries: Vec<FilingSummary> = DocumentList::parse_json(&body)?
            .into_entries()?
            .iter()
            .filter_map(DocumentEntry::to_summary)
            .collect();

        log::debug!("EDINET {}: {} periodic reports", date, summaries.len());
        let summaries = Arc::new(summaries);
        self.listings
            .lock()
            .await
            .insert(date, Arc::clone(&summaries));
        Ok(summaries)
    }

    /// Download the submission archive of a document.
    pub async fn download_submission(&self, document_id: &str) -> Result<Vec<u8>> {
        let key = self.api_key()?;
        if document_id.is_empty() {
            return Err(DataError::EdinetApi("Empty document id".to_string()));
        }

        self.rate_limiter.lock().await.wait().await;

        let endpoint = format!("documents/{document_id}");
        let url = format!(
            "{}/documents/{}?type=1&Subscription-Key={}",
            self.base_url, document_id, key
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(DataError::Network)?;
        let response = check_status(response, &endpoint)?;

        // Errors come back as JSON with a 200 status.
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        if is_json {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::EdinetApi(format!(
                "{endpoint} returned JSON instead of an archive: {body}"
            )));
        }

        let bytes = response.bytes().await.map_err(DataError::Network)?;
        Ok(bytes.to_vec())
    }

    /// Download and parse the EDINET code list. No API key is required.
    pub async fn fetch_code_list(&self) -> Result<CodeList> {
        self.rate_limiter.lock().await.wait().await;

        let response = self
            .client
            .get(CODE_LIST_URL)
            .send()
            .await
            .map_err(DataError::Network)?;
        let response = check_status(response, "codelist")?;
        let archive = response.bytes().await.map_err(DataError::Network)?;
        CodeList::parse(&extract_code_list_csv(&archive)?)
    }
}

fn check_status(response: reqwest::Response, endpoint: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(DEFAULT_RETRY_AFTER_MS, |secs| secs * 1_000);
        return Err(DataError::RateLimit { retry_after_ms });
    }
    Err(DataError::Status {
        status: status.as_u16(),
        endpoint: endpoint.to_string(),
    })
}

/// First entry of an archive whose name satisfies `wanted`.
fn read_archive_entry(archive: &[u8], wanted: impl Fn(&str) -> bool) -> Result<Option<Vec<u8>>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    for index in 0..zip.len() {
        let mut file = zip.by_index(index)?;
        if !wanted(file.name()) {
            continue;
        }
        let mut body = Vec::new();
        file.read_to_end(&mut body)?;
        return Ok(Some(body));
    }
    Ok(None)
}

/// Extract the XBRL instance (`XBRL/PublicDoc/*.xbrl`) from a submission
/// archive.
pub fn extract_xbrl_instance(archive: &[u8]) -> Result<Vec<u8>> {
    read_archive_entry(archive, |name| {
        name.contains("PublicDoc/") && name.ends_with(".xbrl")
    })?
    .ok_or_else(|| DataError::EdinetApi("submission archive has no PublicDoc XBRL instance".to_string()))
}

fn extract_code_list_csv(archive: &[u8]) -> Result<Vec<u8>> {
    read_archive_entry(archive, |name| name.to_ascii_lowercase().ends_with(".csv"))?
        .ok_or_else(|| DataError::EdinetApi("code list archive has no CSV".to_string()))
}

#[async_trait]
impl FilingRegistry for EdinetClient {
    async fn list_filings(
        &self,
        filer_code: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FilingSummary>> {
        // Fail before scanning when the credential is missing.
        self.api_key()?;
        if from > to {
            return Ok(Vec::new());
        }

        let days: Vec<NaiveDate> = from.iter_days().take_while(|d| *d <= to).collect();
        log::info!(
            "Scanning EDINET listings {}..={} ({} days) for {}",
            from,
            to,
            days.len(),
            filer_code
        );

        let listings: Vec<Arc<Vec<FilingSummary>>> = stream::iter(days)
            .map(|day| self.list_documents(day))
            .buffered(LISTING_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(listings
            .iter()
            .flat_map(|day| day.iter())
            .filter(|summary| summary.filer_code == filer_code)
            .cloned()
            .collect())
    }

    async fn forget_listings(&self, from: NaiveDate, to: NaiveDate) {
        let mut listings = self.listings.lock().await;
        let before = listings.len();
        listings.retain(|day, _| !(from..=to).contains(day));
        log::debug!("Dropped {} memoized listing days", before - listings.len());
    }

    async fn download(&self, document_id: &str) -> Result<Vec<u8>> {
        let archive = self.download_submission(document_id).await?;
        extract_xbrl_instance(&archive)
    }
}

impl std::fmt::Debug for EdinetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdinetClient")
            .field("base_url", &self.base_url)
            .field("has_credential", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}
