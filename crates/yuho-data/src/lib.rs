#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/yuho/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod edinet;
pub mod error;
pub mod fetcher;
pub mod registry;
pub mod text;
pub mod types;
pub mod xbrl;

pub use cache::{CacheKey, CacheStats, FilingCache};
pub use error::{DataError, Result};
pub use fetcher::{DEFAULT_LOOKBACK_DAYS, FetchError, FilingFetcher, RetryPolicy};
pub use registry::FilingRegistry;
pub use types::{FilingRecord, Issuer, PeriodKey, PeriodKind};
pub use xbrl::XbrlDocument;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
