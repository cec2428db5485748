//! End-to-end question answering.

use crate::assembler::{AssembleError, ContextAssembler, ExtractionContext};
use crate::config::{ConfigError, Settings};
use crate::directory::EntityDirectory;
use crate::intent::{IntentError, IntentResolver, Resolution, ResolvedQuery, TextCompletion, Turn};
use crate::render::render_context;
use crate::sections::SectionCode;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use yuho_data::{
    DataError, FetchError, FilingCache, FilingFetcher, FilingRegistry, Issuer, PeriodKey,
    RetryPolicy,
};

/// Failures that prevent an answer.
#[derive(Debug, Error)]
pub enum QaError {
    /// The registry failed after retries
    #[error("Remote registry error: {0}")]
    Remote(#[source] DataError),

    /// A fetched filing could not be assembled
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// The resolver could not be built
    #[error(transparent)]
    Intent(#[from] IntentError),

    /// Settings are invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Local storage failed
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Outcome class of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerStatus {
    /// Contexts were assembled
    Resolved,
    /// Several issuers match the question
    Ambiguous,
    /// No issuer or no filing matches
    NotFound,
    /// The question names no period or section
    ParseError,
}

/// Answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// Outcome class
    pub status: AnswerStatus,
    /// Resolved issuer
    pub issuer: Option<Issuer>,
    /// Requested periods, ascending
    pub periods: Vec<PeriodKey>,
    /// Requested sections
    pub sections: Vec<SectionCode>,
    /// Extraction contexts, periods outer and sections inner
    pub contexts: Vec<ExtractionContext>,
    /// Candidate issuers of an ambiguous question
    pub candidates: Vec<Issuer>,
    /// Explanation for anything but a resolved answer
    pub message: String,
}

impl Answer {
    fn unresolved(status: AnswerStatus, message: String) -> Self {
        Self {
            status,
            issuer: None,
            periods: Vec::new(),
            sections: Vec::new(),
            contexts: Vec::new(),
            candidates: Vec::new(),
            message,
        }
    }

    /// Whether contexts were assembled.
    pub fn is_resolved(&self) -> bool {
        self.status == AnswerStatus::Resolved
    }
}

/// Builder for [`ReportQa`].
pub struct ReportQaBuilder {
    directory: Arc<EntityDirectory>,
    registry: Arc<dyn FilingRegistry>,
    settings: Settings,
    cache: Option<FilingCache>,
    completion: Option<Arc<dyn TextCompletion>>,
    retry: Option<RetryPolicy>,
    today: Option<NaiveDate>,
}

impl ReportQaBuilder {
    /// Use an existing cache instead of one rooted at the configured
    /// directory.
    pub fn cache(mut self, cache: FilingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enable the assisted interpretation path.
    pub fn completion(mut self, completion: Arc<dyn TextCompletion>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Override the retry policy derived from the settings.
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Pin the date that caps filing searches.
    pub const fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Build the service.
    pub fn build(self) -> Result<ReportQa, QaError> {
        let cache = match self.cache {
            Some(cache) => cache,
            None => FilingCache::new(&self.settings.cache_dir, self.settings.cache_ttl())?,
        };
        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::with_attempts(self.settings.fetch_attempts));
        let mut fetcher = FilingFetcher::new(self.registry, cache).with_retry(retry);
        if let Some(today) = self.today {
            fetcher = fetcher.with_today(today);
        }
        let resolver = IntentResolver::new(self.directory)?
            .with_optional_completion(self.completion)
            .with_completion_timeout(self.settings.completion_timeout);

        Ok(ReportQa {
            resolver,
            fetcher,
            assembler: ContextAssembler::new(),
            settings: self.settings,
        })
    }
}

impl std::fmt::Debug for ReportQaBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportQaBuilder")
            .field("settings", &self.settings)
            .field("assisted", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}

/// Answers questions about periodic reports.
#[derive(Debug)]
pub struct ReportQa {
    resolver: IntentResolver,
    fetcher: FilingFetcher,
    assembler: ContextAssembler,
    settings: Settings,
}

impl ReportQa {
    /// Start building a service over `directory` and `registry`.
    pub fn builder(
        directory: Arc<EntityDirectory>,
        registry: Arc<dyn FilingRegistry>,
        settings: Settings,
    ) -> ReportQaBuilder {
        ReportQaBuilder {
            directory,
            registry,
            settings,
            cache: None,
            completion: None,
            retry: None,
            today: None,
        }
    }

    /// The question resolver.
    pub const fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    /// The filing cache.
    pub const fn cache(&self) -> &FilingCache {
        self.fetcher.cache()
    }

    /// Settings the service was built with.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Answer a stand-alone question.
    ///
    /// `force_refresh_hint` bypasses the cache in addition to refresh
    /// phrases in the question itself.
    pub async fn answer_question(
        &self,
        question: &str,
        force_refresh_hint: bool,
    ) -> Result<Answer, QaError> {
        self.answer_in_conversation(question, &[], force_refresh_hint)
            .await
    }

    /// Answer a question in the context of earlier turns.
    pub async fn answer_in_conversation(
        &self,
        question: &str,
        history: &[Turn],
        force_refresh_hint: bool,
    ) -> Result<Answer, QaError> {
        match self
            .resolver
            .resolve_in_conversation(question, history)
            .await
        {
            Resolution::Resolved(query) => self.answer_resolved(query, force_refresh_hint).await,
            Resolution::Ambiguous {
                mention,
                candidates,
            } => {
                log::info!("{} issuers match {:?}", candidates.len(), mention);
                let mut answer = Answer::unresolved(
                    AnswerStatus::Ambiguous,
                    format!(
                        "「{mention}」に該当する企業が複数あります。EDINETコードで指定してください。"
                    ),
                );
                answer.candidates = candidates;
                Ok(answer)
            }
            Resolution::NotFound { mention } => {
                let message = match mention {
                    Some(mention) => format!("「{mention}」に該当する企業が見つかりませんでした。"),
                    None => "企業名が抽出できませんでした。".to_string(),
                };
                Ok(Answer::unresolved(AnswerStatus::NotFound, message))
            }
            Resolution::ParseFailure { reason } => {
                Ok(Answer::unresolved(AnswerStatus::ParseError, reason))
            }
        }
    }

    async fn answer_resolved(
        &self,
        query: ResolvedQuery,
        force_refresh_hint: bool,
    ) -> Result<Answer, QaError> {
        let force_refresh = query.force_refresh || force_refresh_hint;
        let lookback_days = self.settings.lookback_days;

        let results = join_all(query.periods.iter().map(|period| {
            self.fetcher
                .fetch(&query.issuer, *period, lookback_days, force_refresh)
        }))
        .await;

        let mut filings = BTreeMap::new();
        let mut missing = Vec::new();
        for (period, result) in query.periods.iter().zip(results) {
            match result {
                Ok(record) => {
                    filings.insert(*period, record);
                }
                Err(FetchError::NotFound { .. }) => missing.push(*period),
                Err(FetchError::Remote(e)) => return Err(QaError::Remote(e)),
            }
        }

        if !missing.is_empty() {
            let periods: Vec<String> = missing.iter().map(ToString::to_string).collect();
            let mut answer = Answer::unresolved(
                AnswerStatus::NotFound,
                format!(
                    "{} の {} の報告書が検索範囲で見つかりませんでした。",
                    query.issuer.canonical_name,
                    periods.join("、")
                ),
            );
            answer.issuer = Some(query.issuer);
            answer.periods = query.periods.into_iter().collect();
            answer.sections = query.sections;
            return Ok(answer);
        }

        let contexts = self.assembler.assemble(&query, &filings)?;
        Ok(Answer {
            status: AnswerStatus::Resolved,
            issuer: Some(query.issuer),
            periods: query.periods.into_iter().collect(),
            sections: query.sections,
            contexts,
            candidates: Vec::new(),
            message: String::new(),
        })
    }

    /// Render `answer` with the configured character budget.
    pub fn render(&self, question: &str, answer: &Answer) -> String {
        render_context(question, answer, self.settings.context_max_chars)
    }
}
