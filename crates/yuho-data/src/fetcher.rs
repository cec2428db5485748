//! Filing retrieval with cache, correction precedence and retries.

use crate::cache::{CacheKey, FilingCache};
use crate::edinet::FilingSummary;
use crate::error::DataError;
use crate::registry::FilingRegistry;
use crate::types::{FilingRecord, Issuer, PeriodKey};
use chrono::{NaiveDate, TimeDelta, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default number of days searched on either side of the filing deadline.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 365;

/// EDINET publishes in Japan Standard Time.
const JST_OFFSET_HOURS: i64 = 9;

/// Outcome of a failed fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The registry has no usable filing for the period
    #[error("No filing found for {filer_code} {period}")]
    NotFound {
        /// Filer code searched
        filer_code: String,
        /// Period searched
        period: PeriodKey,
    },

    /// The registry could not be reached or answered with an error
    #[error("Remote registry error: {0}")]
    Remote(#[source] DataError),
}

/// Exponential backoff for retryable registry failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Policy with `attempts` tries and the default base delay.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Fetches the authoritative filing for an issuer and period.
pub struct FilingFetcher {
    registry: Arc<dyn FilingRegistry>,
    cache: FilingCache,
    retry: RetryPolicy,
    include_corrections: bool,
    today: Option<NaiveDate>,
}

impl FilingFetcher {
    /// Create a correction-aware fetcher with the default retry policy.
    pub fn new(registry: Arc<dyn FilingRegistry>, cache: FilingCache) -> Self {
        Self {
            registry,
            cache,
            retry: RetryPolicy::default(),
            include_corrections: true,
            today: None,
        }
    }

    /// Override the retry policy.
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether amended reports may supersede originals (default `true`).
    pub const fn with_corrections(mut self, include_corrections: bool) -> Self {
        self.include_corrections = include_corrections;
        self
    }

    /// Pin the date used to cap the search window.
    pub const fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// The cache this fetcher writes through to.
    pub const fn cache(&self) -> &FilingCache {
        &self.cache
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| (Utc::now() + TimeDelta::hours(JST_OFFSET_HOURS)).date_naive())
    }

    /// Submission dates searched for `period`: `lookback_days` on either side
    /// of the statutory deadline, capped at today. Both ends are inclusive.
    ///
    /// `None` when the window is empty (the period has not been due yet).
    pub fn search_window(
        &self,
        period: PeriodKey,
        fye_month: u32,
        lookback_days: u32,
    ) -> Option<(NaiveDate, NaiveDate)> {
        let deadline = period.filing_deadline(fye_month)?;
        let span = TimeDelta::days(i64::from(lookback_days));
        let from = deadline.checked_sub_signed(span)?;
        let to = deadline.checked_add_signed(span)?.min(self.today());
        (from <= to).then_some((from, to))
    }

    /// Authoritative filing for `issuer` and `period`.
    ///
    /// A fresh cache entry is returned without contacting the registry
    /// unless `force_refresh` is set, which also drops listings the registry
    /// memoized for the search window. Otherwise the registry is listed over
    /// the search window, the latest usable submission for the period is
    /// downloaded, and the result is written through to the cache.
    ///
    /// The write-through is best effort: a record that cannot be stored is
    /// still returned, and the failure is logged.
    pub async fn fetch(
        &self,
        issuer: &Issuer,
        period: PeriodKey,
        lookback_days: u32,
        force_refresh: bool,
    ) -> Result<FilingRecord, FetchError> {
        let key = CacheKey::new(&issuer.filer_code, period, self.include_corrections);
        if force_refresh {
            log::debug!("Force refresh requested for {}", key.file_name());
        } else if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let not_found = || FetchError::NotFound {
            filer_code: issuer.filer_code.clone(),
            period,
        };

        let fye_month = issuer.year_end_month();
        let Some((from, to)) = self.search_window(period, fye_month, lookback_days) else {
            log::debug!("{} {} is not due yet", issuer.filer_code, period);
            return Err(not_found());
        };

        if force_refresh {
            self.registry.forget_listings(from, to).await;
        }
        log::info!(
            "Listing filings of {} for {} between {} and {}",
            issuer.filer_code,
            period,
            from,
            to
        );
        let summaries = self
            .retrying("list filings", || {
                self.registry.list_filings(&issuer.filer_code, from, to)
            })
            .await
            .map_err(FetchError::Remote)?;

        let chosen = select_authoritative(
            &summaries,
            &issuer.filer_code,
            period,
            fye_month,
            self.include_corrections,
        )
        .ok_or_else(not_found)?;
        log::info!(
            "Selected {} ({}, submitted {}) for {} {}",
            chosen.document_id,
            if chosen.doc_type.is_correction() {
                "correction"
            } else {
                "original"
            },
            chosen.submitted_at,
            issuer.filer_code,
            period
        );

        let raw_body = self
            .retrying("download", || self.registry.download(&chosen.document_id))
            .await
            .map_err(FetchError::Remote)?;

        let record = FilingRecord {
            issuer: issuer.clone(),
            period,
            document_id: chosen.document_id.clone(),
            is_correction: chosen.doc_type.is_correction(),
            submitted_at: chosen.submitted_at,
            raw_body,
        };

        if let Err(e) = self.cache.put(&key, &record) {
            log::warn!("Failed to cache {}: {}", record.document_id, e);
        }
        Ok(record)
    }

    async fn retrying<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, DataError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    let mut delay = self.retry.delay_for(attempt);
                    if let DataError::RateLimit { retry_after_ms } = &e {
                        delay = delay.max(Duration::from_millis(*retry_after_ms));
                    }
                    log::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt,
                        self.retry.attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for FilingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilingFetcher")
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("include_corrections", &self.include_corrections)
            .finish_non_exhaustive()
    }
}

/// Latest usable submission of `filer_code` covering `period`.
///
/// Withdrawn submissions and submissions without XBRL are skipped; annual
/// reports only match full-year periods and quarterly reports only quarters.
/// Without `include_corrections` only originals are considered.
pub fn select_authoritative<'a>(
    summaries: &'a [FilingSummary],
    filer_code: &str,
    period: PeriodKey,
    fye_month: u32,
    include_corrections: bool,
) -> Option<&'a FilingSummary> {
    summaries
        .iter()
        .filter(|s| s.filer_code == filer_code && s.is_usable())
        .filter(|s| s.doc_type.is_annual() == period.is_full_year())
        .filter(|s| include_corrections || !s.doc_type.is_correction())
        .filter(|s| s.period_key(fye_month) == Some(period))
        .max_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.document_id.cmp(&b.document_id))
        })
}
