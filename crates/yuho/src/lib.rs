#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/yuho/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod assembler;
pub mod config;
pub mod directory;
pub mod intent;
pub mod period;
pub mod render;
pub mod sections;
pub mod service;

/// Retrieval layer.
pub use yuho_data as data;

pub use assembler::{AssembleError, ContextAssembler, ExtractionContext};
pub use config::{ConfigError, Settings};
pub use directory::{Candidate, EntityDirectory, MatchKind};
pub use intent::{
    CompletionError, IntentError, IntentResolver, Query, Resolution, ResolvedQuery,
    TextCompletion, Turn,
};
pub use period::{PeriodError, PeriodParser};
pub use render::render_context;
pub use sections::{SectionCode, SectionDef, SectionVocabulary};
pub use service::{Answer, AnswerStatus, QaError, ReportQa, ReportQaBuilder};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
