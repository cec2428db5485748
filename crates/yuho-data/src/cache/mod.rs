//! On-disk caching of fetched filings.

pub mod filing;

pub use filing::{CacheEntry, CacheKey, CacheStats, DEFAULT_TTL_HOURS, EntryInfo, FilingCache};
