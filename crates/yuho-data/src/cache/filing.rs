//! TTL-bounded filing cache backed by a directory of entry files.
//!
//! Each entry lives in `<root>/filings/<filer>_<year>_<FY|Qn>_<amended|original>.entry`
//! and consists of a single JSON header line followed by the raw XBRL body.
//! Entries are written to a temporary file in the same directory and renamed
//! into place, so a reader sees either the previous or the new entry in full.

use crate::error::{DataError, Result};
use crate::types::{FilingRecord, Issuer, PeriodKey};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Default time-to-live of a cache entry.
pub const DEFAULT_TTL_HOURS: i64 = 24;

const ENTRY_EXTENSION: &str = "entry";

/// Identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// EDINET filer code
    pub filer_code: String,
    /// Reporting period
    pub period: PeriodKey,
    /// Whether corrections were considered when the filing was selected
    pub correction_aware: bool,
}

impl CacheKey {
    /// Create a key.
    pub fn new(filer_code: impl Into<String>, period: PeriodKey, correction_aware: bool) -> Self {
        Self {
            filer_code: filer_code.into(),
            period,
            correction_aware,
        }
    }

    /// File name of the entry for this key.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            self.filer_code,
            self.period.fiscal_year,
            self.period.code(),
            if self.correction_aware {
                "amended"
            } else {
                "original"
            },
            ENTRY_EXTENSION
        )
    }
}

/// Header line of an entry file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    key: CacheKey,
    issuer: Issuer,
    document_id: String,
    is_correction: bool,
    submitted_at: NaiveDateTime,
    fetched_at: DateTime<Utc>,
    body_len: usize,
}

/// A cached filing together with its fetch time.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Entry identity
    pub key: CacheKey,
    /// Cached filing
    pub record: FilingRecord,
    /// When the filing was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Header-level description of an entry, without its body.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Entry identity
    pub key: CacheKey,
    /// Cached document id
    pub document_id: String,
    /// Whether the cached filing is a correction
    pub is_correction: bool,
    /// When the filing was fetched
    pub fetched_at: DateTime<Utc>,
    /// Size of the entry file
    pub bytes: u64,
    /// Whether the entry is past its TTL
    pub expired: bool,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of readable entries
    pub entries: usize,
    /// Total size of the readable entries
    pub bytes: u64,
    /// Entries past their TTL
    pub expired: usize,
    /// Entry files that could not be read
    pub corrupt: usize,
}

/// TTL-bounded store of fetched filings.
#[derive(Debug, Clone)]
pub struct FilingCache {
    dir: PathBuf,
    ttl: TimeDelta,
}

impl FilingCache {
    /// Open (creating if needed) the cache below `root`.
    ///
    /// # Arguments
    /// * `root` - Cache root; entries live in its `filings` subdirectory
    /// * `ttl` - Maximum age of an entry that is still served
    pub fn new<P: AsRef<Path>>(root: P, ttl: TimeDelta) -> Result<Self> {
        let dir = root.as_ref().join("filings");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, ttl })
    }

    /// Open the cache with the default 24 hour TTL.
    pub fn with_default_ttl<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::new(root, TimeDelta::hours(DEFAULT_TTL_HOURS))
    }

    /// Directory holding the entry files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Configured TTL.
    pub const fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Fresh cached filing for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<FilingRecord> {
        self.get_at(key, Utc::now())
    }

    /// Fresh cached filing for `key` as of `now`.
    ///
    /// Absent, expired and unreadable entries are all misses.
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<FilingRecord> {
        match self.load(key) {
            Ok(Some(entry)) if self.is_stale(entry.fetched_at, now) => {
                log::debug!(
                    "Cache expired for {} (fetched {})",
                    key.file_name(),
                    entry.fetched_at
                );
                None
            }
            Ok(Some(entry)) => {
                log::debug!("Cache hit for {}", key.file_name());
                Some(entry.record)
            }
            Ok(None) => {
                log::debug!("Cache miss for {}", key.file_name());
                None
            }
            Err(e) => {
                log::warn!("Ignoring unreadable cache entry: {}", e);
                None
            }
        }
    }

    /// Whether the entry for `key` would be a miss at `now`.
    pub fn is_expired(&self, key: &CacheKey, now: DateTime<Utc>) -> bool {
        match self.load(key) {
            Ok(Some(entry)) => self.is_stale(entry.fetched_at, now),
            _ => true,
        }
    }

    fn is_stale(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(fetched_at) > self.ttl
    }

    /// Read the entry for `key` regardless of its age.
    ///
    /// # Errors
    /// `CacheCorruption` when the file exists but cannot be decoded.
    pub fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: &str| DataError::CacheCorruption {
            path: path.clone(),
            reason: reason.to_string(),
        };

        let split = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| corrupt("missing header line"))?;
        let header: EntryHeader = serde_json::from_slice(&raw[..split])
            .map_err(|e| corrupt(&format!("bad header: {e}")))?;
        let body = &raw[split + 1..];

        if header.body_len != body.len() {
            return Err(corrupt(&format!(
                "body is {} bytes, header says {}",
                body.len(),
                header.body_len
            )));
        }
        if &header.key != key {
            return Err(corrupt("entry belongs to another key"));
        }

        Ok(Some(CacheEntry {
            record: FilingRecord {
                issuer: header.issuer,
                period: header.key.period,
                document_id: header.document_id,
                is_correction: header.is_correction,
                submitted_at: header.submitted_at,
                raw_body: body.to_vec(),
            },
            key: header.key,
            fetched_at: header.fetched_at,
        }))
    }

    /// Store `record` under `key`, stamped with the current time.
    pub fn put(&self, key: &CacheKey, record: &FilingRecord) -> Result<()> {
        self.put_at(key, record, Utc::now())
    }

    /// Store `record` under `key` with an explicit fetch time.
    pub fn put_at(
        &self,
        key: &CacheKey,
        record: &FilingRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let header = EntryHeader {
            key: key.clone(),
            issuer: record.issuer.clone(),
            document_id: record.document_id.clone(),
            is_correction: record.is_correction,
            submitted_at: record.submitted_at,
            fetched_at,
            body_len: record.raw_body.len(),
        };

        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut file, &header)?;
        file.write_all(b"\n")?;
        file.write_all(&record.raw_body)?;
        file.flush()?;
        file.persist(self.path_for(key))
            .map_err(|e| DataError::Io(e.error))?;

        log::debug!(
            "Cached {} as {} ({} bytes)",
            record.document_id,
            key.file_name(),
            record.raw_body.len()
        );
        Ok(())
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Header-level listing of all readable entries.
    ///
    /// Unreadable entry files are skipped.
    pub fn entries(&self) -> Result<Vec<EntryInfo>> {
        let now = Utc::now();
        let mut infos = Vec::new();
        for path in self.entry_paths()? {
            match self.read_info(&path, now) {
                Ok(info) => infos.push(info),
                Err(e) => log::warn!("Skipping cache entry: {}", e),
            }
        }
        Ok(infos)
    }

    fn read_info(&self, path: &Path, now: DateTime<Utc>) -> Result<EntryInfo> {
        let file = fs::File::open(path)?;
        let bytes = file.metadata()?.len();
        let mut line = String::new();
        BufReader::new(file).read_line(&mut line)?;
        let header: EntryHeader =
            serde_json::from_str(line.trim_end()).map_err(|e| DataError::CacheCorruption {
                path: path.to_path_buf(),
                reason: format!("bad header: {e}"),
            })?;

        Ok(EntryInfo {
            expired: self.is_stale(header.fetched_at, now),
            key: header.key,
            document_id: header.document_id,
            is_correction: header.is_correction,
            fetched_at: header.fetched_at,
            bytes,
        })
    }

    /// Entry counts and sizes.
    pub fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now();
        let mut stats = CacheStats::default();
        for path in self.entry_paths()? {
            match self.read_info(&path, now) {
                Ok(info) => {
                    stats.entries += 1;
                    stats.bytes += info.bytes;
                    if info.expired {
                        stats.expired += 1;
                    }
                }
                Err(_) => stats.corrupt += 1,
            }
        }
        Ok(stats)
    }

    /// Remove every entry file. Returns the number of files removed.
    pub fn clear(&self) -> Result<usize> {
        let paths = self.entry_paths()?;
        for path in &paths {
            fs::remove_file(path)?;
        }
        log::info!("Cleared {} cache entries from {}", paths.len(), self.dir.display());
        Ok(paths.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(document_id: &str, is_correction: bool) -> FilingRecord {
        FilingRecord {
            issuer: Issuer::new("E02144", "トヨタ自動車株式会社").with_securities_code("7203"),
            period: PeriodKey::full_year(2024),
            document_id: document_id.to_string(),
            is_correction,
            submitted_at: NaiveDate::from_ymd_opt(2024, 6, 18)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
            raw_body: b"<xbrli:xbrl>\n\xE4\xBA\x8B\xE6\xA5\xAD</xbrli:xbrl>".to_vec(),
        }
    }

    fn key() -> CacheKey {
        CacheKey::new("E02144", PeriodKey::full_year(2024), true)
    }

    #[test]
    fn test_file_name() {
        assert_eq!(key().file_name(), "E02144_2024_FY_amended.entry");
        let q2 = CacheKey::new("E02144", PeriodKey::quarter(2025, 2).unwrap(), false);
        assert_eq!(q2.file_name(), "E02144_2025_Q2_original.entry");
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = FilingCache::with_default_ttl(dir.path()).unwrap();
        let stored = record("S100TR7I", false);

        assert!(cache.get(&key()).is_none());
        cache.put(&key(), &stored).unwrap();
        assert_eq!(cache.get(&key()), Some(stored));
    }

    #[test]
    fn test_correction_awareness_is_part_of_the_key() {
        let dir = TempDir::new().unwrap();
        let cache = FilingCache::with_default_ttl(dir.path()).unwrap();
        cache.put(&key(), &record("S100AMND", true)).unwrap();

        let originals = CacheKey::new("E02144", PeriodKey::full_year(2024), false);
        assert!(cache.get(&originals).is_none());
    }

    #[test]
    fn test_expiry() {
        let dir = TempDir::new().unwrap();
        let cache = FilingCache::new(dir.path(), TimeDelta::hours(24)).unwrap();
        let fetched_at = Utc::now() - TimeDelta::hours(25);
        cache
            .put_at(&key(), &record("S100TR7I", false), fetched_at)
            .unwrap();

        assert!(cache.get(&key()).is_none());
        assert!(cache.is_expired(&key(), Utc::now()));
        // still on disk until overwritten
        assert!(cache.load(&key()).unwrap().is_some());
        assert!(!cache.is_expired(&key(), fetched_at + TimeDelta::hours(24)));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = FilingCache::with_default_ttl(dir.path()).unwrap();
        fs::write(cache.dir().join(key().file_name()), b"{not json\nbody").unwrap();

        assert!(matches!(
            cache.load(&key()),
            Err(DataError::CacheCorruption { .. })
        ));
        assert!(cache.get(&key()).is_none());
        assert_eq!(cache.stats().unwrap().corrupt, 1);
    }

    #[test]
    fn test_truncated_body_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let cache = FilingCache::with_default_ttl(dir.path()).unwrap();
        cache.put(&key(), &record("S100TR7I", false)).unwrap();

        let path = cache.dir().join(key().file_name());
        let mut raw = fs::read(&path).unwrap();
        raw.truncate(raw.len() - 3);
        fs::write(&path, raw).unwrap();

        assert!(cache.get(&key()).is_none());
    }

    #[test]
    fn test_stats_entries_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = FilingCache::with_default_ttl(dir.path()).unwrap();
        cache.put(&key(), &record("S100TR7I", false)).unwrap();
        let old = CacheKey::new("E02144", PeriodKey::full_year(2023), true);
        cache
            .put_at(&old, &record("S100QQQQ", false), Utc::now() - TimeDelta::days(3))
            .unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.expired, 1);
        assert!(stats.bytes > 0);

        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.document_id == "S100TR7I" && !e.expired));

        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
    }
}
