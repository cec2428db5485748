//! Error types for data operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status from the registry
    #[error("HTTP {status} from {endpoint}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Endpoint that returned the status
        endpoint: String,
    },

    /// Rate limit error
    #[error("Rate limit exceeded, please retry after {retry_after_ms}ms")]
    RateLimit {
        /// Milliseconds to wait before retrying
        retry_after_ms: u64,
    },

    /// The registry answered with a payload we could not interpret
    #[error("EDINET API error: {0}")]
    EdinetApi(String),

    /// No registry credential was configured
    #[error("EDINET API key is not configured (set EDINET_API_KEY)")]
    MissingCredential,

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// ZIP archive error
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A cache entry exists on disk but cannot be decoded
    #[error("Corrupt cache entry {}: {reason}", path.display())]
    CacheCorruption {
        /// Path of the entry
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Filing not found
    #[error("Filing not found: {0}")]
    FilingNotFound(String),
}

impl DataError {
    /// Whether a remote call that failed with this error is worth retrying.
    ///
    /// Transport failures, rate limiting and 5xx answers are transient. A
    /// missing credential, a 4xx answer or a payload we cannot read will fail
    /// the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimit { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DataError::RateLimit { retry_after_ms: 10 }.is_retryable());
        assert!(
            DataError::Status {
                status: 503,
                endpoint: "documents.json".to_string()
            }
            .is_retryable()
        );
        assert!(
            !DataError::Status {
                status: 404,
                endpoint: "documents/S100XXXX".to_string()
            }
            .is_retryable()
        );
        assert!(!DataError::MissingCredential.is_retryable());
        assert!(!DataError::EdinetApi("unexpected payload".to_string()).is_retryable());
    }
}
