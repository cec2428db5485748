//! Question interpretation.
//!
//! A question is turned into a [`Query`]: the issuer candidates it mentions,
//! the fiscal periods and the report sections it asks about, and whether the
//! caller asked for fresh data. Interpretation first goes through an optional
//! [`TextCompletion`] capability and falls back to deterministic rules when
//! the capability is absent, fails, times out, or returns something that does
//! not name one issuer, a period and a section.
//!
//! ```no_run
//! use std::sync::Arc;
//! use yuho::directory::EntityDirectory;
//! use yuho::intent::{IntentResolver, Resolution};
//!
//! # async fn run(directory: EntityDirectory) -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = IntentResolver::new(Arc::new(directory))?;
//! match resolver.resolve("トヨタ(7203)の2024年3月期の事業等のリスクを教えて").await {
//!     Resolution::Resolved(query) => println!("{} {:?}", query.issuer, query.periods),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

mod assisted;
pub mod completion;
mod rules;

pub use completion::{CompletionError, Role, TextCompletion, Turn};

use crate::directory::EntityDirectory;
use crate::period::{PeriodError, PeriodParser};
use crate::sections::{SectionCode, SectionVocabulary};
use assisted::Interpretation;
use rules::MentionExtractor;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use yuho_data::{Issuer, PeriodKey};

/// User turns of the history consulted for context.
pub const HISTORY_TURNS: usize = 8;

/// Default deadline of the assisted path.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(20);

/// Resolver construction errors.
#[derive(Debug, Error)]
pub enum IntentError {
    /// A mention pattern failed to compile
    #[error("Invalid mention pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The period parser failed to build
    #[error(transparent)]
    Period(#[from] PeriodError),
}

/// Which interpretation path produced a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpretationSource {
    /// The text-completion capability
    Assisted,
    /// The deterministic rules
    Rules,
}

/// A question's retrieval key before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Mention the issuers were matched from
    pub mention: Option<String>,
    /// Matched issuers, strongest first
    pub issuer_candidates: Vec<Issuer>,
    /// Requested periods, ascending
    pub periods: BTreeSet<PeriodKey>,
    /// Requested sections, in the order asked
    pub sections: Vec<SectionCode>,
    /// Whether cached filings must be bypassed
    pub force_refresh: bool,
    /// Path that produced the query
    pub source: InterpretationSource,
}

/// A query naming exactly one issuer, at least one period and at least one
/// section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedQuery {
    /// The issuer
    pub issuer: Issuer,
    /// Requested periods, ascending
    pub periods: BTreeSet<PeriodKey>,
    /// Requested sections, in the order asked
    pub sections: Vec<SectionCode>,
    /// Whether cached filings must be bypassed
    pub force_refresh: bool,
    /// Path that produced the query
    pub source: InterpretationSource,
}

/// Outcome of interpreting a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Ready to fetch
    Resolved(ResolvedQuery),
    /// Several issuers match; nothing may be fetched
    Ambiguous {
        /// The ambiguous mention
        mention: String,
        /// Matching issuers, strongest first
        candidates: Vec<Issuer>,
    },
    /// No issuer matches
    NotFound {
        /// The mention that matched nothing, if any was found
        mention: Option<String>,
    },
    /// The question names no period or no section
    ParseFailure {
        /// What is missing
        reason: String,
    },
}

impl Query {
    /// Validate the query: issuer first, then periods, then sections.
    pub fn into_resolution(self) -> Resolution {
        let mut candidates = self.issuer_candidates;
        match candidates.len() {
            0 => {
                return Resolution::NotFound {
                    mention: self.mention,
                };
            }
            1 => {}
            _ => {
                return Resolution::Ambiguous {
                    mention: self.mention.unwrap_or_default(),
                    candidates,
                };
            }
        }
        if self.periods.is_empty() {
            return Resolution::ParseFailure {
                reason: "決算期を特定できませんでした".to_string(),
            };
        }
        if self.sections.is_empty() {
            return Resolution::ParseFailure {
                reason: "参照セクションを特定できませんでした".to_string(),
            };
        }
        let issuer = candidates.remove(0);
        Resolution::Resolved(ResolvedQuery {
            issuer,
            periods: self.periods,
            sections: self.sections,
            force_refresh: self.force_refresh,
            source: self.source,
        })
    }
}

/// Turns questions into resolutions.
pub struct IntentResolver {
    directory: Arc<EntityDirectory>,
    vocabulary: SectionVocabulary,
    periods: PeriodParser,
    mentions: MentionExtractor,
    completion: Option<Arc<dyn TextCompletion>>,
    completion_timeout: Duration,
}

impl IntentResolver {
    /// A rule-only resolver over `directory`.
    pub fn new(directory: Arc<EntityDirectory>) -> Result<Self, IntentError> {
        Ok(Self {
            directory,
            vocabulary: SectionVocabulary::standard(),
            periods: PeriodParser::new()?,
            mentions: MentionExtractor::new()?,
            completion: None,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
        })
    }

    /// Use `completion` for the assisted path.
    pub fn with_completion(mut self, completion: Arc<dyn TextCompletion>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Use `completion` when present.
    pub fn with_optional_completion(mut self, completion: Option<Arc<dyn TextCompletion>>) -> Self {
        self.completion = completion;
        self
    }

    /// Deadline of the assisted path.
    pub const fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// The directory issuers are matched against.
    pub fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    /// The section vocabulary.
    pub const fn vocabulary(&self) -> &SectionVocabulary {
        &self.vocabulary
    }

    /// Interpret a stand-alone question.
    pub async fn resolve(&self, question: &str) -> Resolution {
        self.resolve_in_conversation(question, &[]).await
    }

    /// Interpret a question in the context of earlier turns.
    ///
    /// Only the user turns among the last [`HISTORY_TURNS`] turns are
    /// consulted; they supply the issuer or periods a follow-up question
    /// leaves out.
    pub async fn resolve_in_conversation(&self, question: &str, history: &[Turn]) -> Resolution {
        let context = &history[history.len().saturating_sub(HISTORY_TURNS)..];
        let recent_user: Vec<&str> = context
            .iter()
            .filter(|t| t.role == Role::User && !t.content.trim().is_empty())
            .map(|t| t.content.as_str())
            .collect();
        let force_refresh = rules::wants_refresh(question);

        if let Some(query) = self.assisted(question, context, &recent_user, force_refresh).await {
            log::debug!("Question interpreted by the assisted path");
            return query.into_resolution();
        }
        log::debug!("Question interpreted by rules");
        self.by_rules(question, &recent_user, force_refresh)
            .into_resolution()
    }

    async fn assisted(
        &self,
        question: &str,
        context: &[Turn],
        recent_user: &[&str],
        force_refresh: bool,
    ) -> Option<Query> {
        let completion = self.completion.as_deref()?;

        let candidates: Vec<_> = self
            .mentions
            .mentions(question, &self.periods, &self.vocabulary)
            .iter()
            .flat_map(|m| {
                self.directory
                    .rank(m)
                    .into_iter()
                    .take(assisted::CANDIDATES_PER_MENTION)
            })
            .collect();
        let prompt = assisted::build_prompt(question, recent_user, &self.vocabulary, &candidates);
        let interpretation =
            assisted::interpret(completion, &prompt, context, self.completion_timeout).await?;

        let query = self.from_interpretation(interpretation, force_refresh);
        let complete = query.issuer_candidates.len() == 1
            && !query.periods.is_empty()
            && !query.sections.is_empty();
        if !complete {
            log::debug!("Assisted interpretation incomplete: {:?}", query);
            return None;
        }
        Some(query)
    }

    fn from_interpretation(&self, interpretation: Interpretation, force_refresh: bool) -> Query {
        let mention = interpretation
            .company
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let issuer_candidates = mention
            .as_deref()
            .map(|m| self.directory.resolve(m))
            .unwrap_or_default();

        let fye = match issuer_candidates.as_slice() {
            [issuer] => Some(issuer.year_end_month()),
            _ => None,
        };
        let periods = interpretation
            .periods
            .iter()
            .filter_map(|p| self.parse_periods(p, fye))
            .flatten()
            .collect();

        let mut sections = Vec::new();
        for phrase in &interpretation.sections {
            if let Some(code) = self.vocabulary.lookup(phrase) {
                if !sections.contains(&code) {
                    sections.push(code);
                }
            }
        }

        Query {
            mention,
            issuer_candidates,
            periods,
            sections,
            force_refresh,
            source: InterpretationSource::Assisted,
        }
    }

    fn by_rules(&self, question: &str, recent_user: &[&str], force_refresh: bool) -> Query {
        // Newest context first: the question, then earlier user turns.
        let texts: Vec<&str> = std::iter::once(question)
            .chain(recent_user.iter().rev().copied())
            .collect();

        // The newest text naming any company decides; older turns are only
        // consulted when nothing newer names one.
        let mut mention = None;
        let mut issuer_candidates = Vec::new();
        for text in &texts {
            let tokens = self.mentions.mentions(text, &self.periods, &self.vocabulary);
            if tokens.is_empty() {
                continue;
            }
            for token in &tokens {
                let found = self.directory.resolve(token);
                if !found.is_empty() {
                    mention = Some(token.clone());
                    issuer_candidates = found;
                    break;
                }
            }
            if mention.is_none() {
                mention = tokens.into_iter().next();
            }
            break;
        }

        let fye = match issuer_candidates.as_slice() {
            [issuer] => Some(issuer.year_end_month()),
            _ => None,
        };
        let periods = texts
            .iter()
            .find_map(|text| self.parse_periods(text, fye))
            .unwrap_or_default();

        Query {
            mention,
            issuer_candidates,
            periods,
            sections: self.vocabulary.scan(question),
            force_refresh,
            source: InterpretationSource::Rules,
        }
    }

    fn parse_periods(&self, text: &str, fye: Option<u32>) -> Option<BTreeSet<PeriodKey>> {
        let parsed = match fye {
            Some(month) => self.periods.parse_for(text, month),
            None => self.periods.parse(text),
        };
        parsed.ok()
    }
}

impl std::fmt::Debug for IntentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentResolver")
            .field("issuers", &self.directory.len())
            .field("assisted", &self.completion.is_some())
            .field("completion_timeout", &self.completion_timeout)
            .finish_non_exhaustive()
    }
}
