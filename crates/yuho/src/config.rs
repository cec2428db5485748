//! Runtime settings read from the environment.

use chrono::TimeDelta;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use yuho_data::DEFAULT_LOOKBACK_DAYS;
use yuho_data::cache::DEFAULT_TTL_HOURS;

/// Registry credential.
pub const API_KEY_VAR: &str = "EDINET_API_KEY";
/// Cache root.
pub const CACHE_DIR_VAR: &str = "EDINET_CACHE_DIR";
/// Cache time-to-live in hours.
pub const CACHE_TTL_VAR: &str = "EDINET_CACHE_TTL_HOURS";
/// Days searched on either side of the filing deadline.
pub const LOOKBACK_VAR: &str = "EDINET_LOOKBACK_DAYS";
/// Local copy of the EDINET code list.
pub const CODE_LIST_VAR: &str = "EDINET_CODELIST_PATH";
/// Deadline of the assisted interpretation path in seconds.
pub const COMPLETION_TIMEOUT_VAR: &str = "YUHO_COMPLETION_TIMEOUT_SECS";
/// Registry attempts per request.
pub const FETCH_ATTEMPTS_VAR: &str = "YUHO_FETCH_ATTEMPTS";
/// Character budget per rendered section.
pub const CONTEXT_MAX_CHARS_VAR: &str = "YUHO_CONTEXT_MAX_CHARS";

/// Ten years; keeps the TTL well inside `TimeDelta`'s range.
const MAX_CACHE_TTL_HOURS: i64 = 24 * 365 * 10;
const MIN_LOOKBACK_DAYS: u32 = 7;
const MAX_LOOKBACK_DAYS: u32 = 730;
const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 20;
const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Default character budget per rendered section.
pub const DEFAULT_CONTEXT_MAX_CHARS: usize = 20_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set to something that is not a number
    #[error("{var} must be a non-negative integer, got {value:?}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },

    /// No cache directory was configured and the platform has none
    #[error("No cache directory available; set EDINET_CACHE_DIR")]
    NoCacheDir,
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Registry credential
    pub api_key: Option<String>,
    /// Cache root
    pub cache_dir: PathBuf,
    /// Cache time-to-live in hours (1 to 87 600)
    pub cache_ttl_hours: i64,
    /// Days searched on either side of the filing deadline (7-730)
    ///
    /// EDINET lists submissions one day per request, so an uncached search
    /// costs up to `2 * lookback_days + 1` listing requests per period. At the
    /// client's 100 ms spacing the default 365 days takes over a minute on a
    /// cold start; days already listed by the same client are not requested
    /// again.
    pub lookback_days: u32,
    /// Local code-list CSV, downloaded when unset
    pub code_list_path: Option<PathBuf>,
    /// Deadline of the assisted interpretation path
    pub completion_timeout: Duration,
    /// Registry attempts per request (at least 1)
    pub fetch_attempts: u32,
    /// Character budget per rendered section
    pub context_max_chars: usize,
}

impl Settings {
    /// Defaults rooted at `cache_dir`.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_key: None,
            cache_dir: cache_dir.into(),
            cache_ttl_hours: DEFAULT_TTL_HOURS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            code_list_path: None,
            completion_timeout: Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS),
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            context_max_chars: DEFAULT_CONTEXT_MAX_CHARS,
        }
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its
    /// value. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cache_dir = match get(CACHE_DIR_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => default_cache_dir().ok_or(ConfigError::NoCacheDir)?,
        };
        let mut settings = Self::with_cache_dir(cache_dir);
        settings.api_key = get(API_KEY_VAR);
        settings.code_list_path = get(CODE_LIST_VAR).map(PathBuf::from);

        if let Some(hours) = number::<i64>(CACHE_TTL_VAR, get(CACHE_TTL_VAR))? {
            settings.cache_ttl_hours = hours.clamp(1, MAX_CACHE_TTL_HOURS);
        }
        if let Some(days) = number::<u32>(LOOKBACK_VAR, get(LOOKBACK_VAR))? {
            settings.lookback_days = days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS);
        }
        if let Some(secs) = number::<u64>(COMPLETION_TIMEOUT_VAR, get(COMPLETION_TIMEOUT_VAR))? {
            settings.completion_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = number::<u32>(FETCH_ATTEMPTS_VAR, get(FETCH_ATTEMPTS_VAR))? {
            settings.fetch_attempts = attempts.max(1);
        }
        if let Some(chars) = number::<usize>(CONTEXT_MAX_CHARS_VAR, get(CONTEXT_MAX_CHARS_VAR))? {
            settings.context_max_chars = chars;
        }
        Ok(settings)
    }

    /// Cache time-to-live, clamped to 1 to 87 600 hours.
    pub fn cache_ttl(&self) -> TimeDelta {
        TimeDelta::hours(self.cache_ttl_hours.clamp(1, MAX_CACHE_TTL_HOURS))
    }
}

/// `<platform cache dir>/yuho`.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("yuho"))
}

fn number<T: FromStr>(var: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[(CACHE_DIR_VAR, "/tmp/yuho")])).unwrap();
        assert_eq!(settings, Settings::with_cache_dir("/tmp/yuho"));
        assert_eq!(settings.cache_ttl_hours, 24);
        assert_eq!(settings.lookback_days, 365);
        assert_eq!(settings.completion_timeout, Duration::from_secs(20));
        assert_eq!(settings.fetch_attempts, 3);
        assert_eq!(settings.context_max_chars, 20_000);
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_overrides_and_clamps() {
        let settings = Settings::from_lookup(lookup(&[
            (CACHE_DIR_VAR, "/tmp/yuho"),
            (API_KEY_VAR, " secret "),
            (CACHE_TTL_VAR, "0"),
            (LOOKBACK_VAR, "5000"),
            (COMPLETION_TIMEOUT_VAR, "5"),
            (FETCH_ATTEMPTS_VAR, "0"),
            (CODE_LIST_VAR, "/data/EdinetcodeDlInfo.csv"),
        ]))
        .unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.cache_ttl_hours, 1);
        assert_eq!(settings.lookback_days, 730);
        assert_eq!(settings.completion_timeout, Duration::from_secs(5));
        assert_eq!(settings.fetch_attempts, 1);
        assert_eq!(
            settings.code_list_path,
            Some(PathBuf::from("/data/EdinetcodeDlInfo.csv"))
        );
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let settings = Settings::from_lookup(lookup(&[
            (CACHE_DIR_VAR, "/tmp/yuho"),
            (CACHE_TTL_VAR, "9999999999999"),
        ]))
        .unwrap();
        assert_eq!(settings.cache_ttl_hours, MAX_CACHE_TTL_HOURS);
        assert_eq!(settings.cache_ttl().num_hours(), 87_600);

        let mut direct = Settings::with_cache_dir("/tmp/yuho");
        direct.cache_ttl_hours = i64::MAX;
        assert_eq!(direct.cache_ttl(), TimeDelta::hours(MAX_CACHE_TTL_HOURS));
        direct.cache_ttl_hours = -5;
        assert_eq!(direct.cache_ttl(), TimeDelta::hours(1));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let settings =
            Settings::from_lookup(lookup(&[(CACHE_DIR_VAR, "/tmp/yuho"), (API_KEY_VAR, "  ")])).unwrap();
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_invalid_number() {
        let result = Settings::from_lookup(lookup(&[
            (CACHE_DIR_VAR, "/tmp/yuho"),
            (LOOKBACK_VAR, "a year"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { var: LOOKBACK_VAR, .. })
        ));
    }
}
