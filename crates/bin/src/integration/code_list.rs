//! Issuer directory loading.
//!
//! The directory comes from a local code-list CSV when one is configured.
//! Otherwise the EDINET code list is downloaded and kept next to the filing
//! cache as JSON for a week.

use std::path::{Path, PathBuf};
use std::time::Duration;
use yuho::{EntityDirectory, Settings};
use yuho_data::Issuer;
use yuho_data::edinet::EdinetClient;
use yuho_data::error::DataError;

/// Age after which the downloaded code list is fetched again.
const CODE_LIST_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const CODE_LIST_FILE: &str = "codelist.json";

/// Error type for directory loading.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CodeListError {
    /// Download or parse failure
    #[error("Code list error: {0}")]
    Data(#[from] DataError),
    /// Local file failure
    #[error("Code list file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// The cached copy is unreadable
    #[error("Cached code list is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Path of the cached code list under `cache_dir`.
pub(crate) fn cached_code_list_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(CODE_LIST_FILE)
}

/// Build the issuer directory configured by `settings`.
pub(crate) async fn load_directory(
    settings: &Settings,
    client: &EdinetClient,
) -> Result<EntityDirectory, CodeListError> {
    if let Some(path) = &settings.code_list_path {
        log::info!("Loading code list from {}", path.display());
        let raw = std::fs::read(path).map_err(|source| CodeListError::Io {
            path: path.clone(),
            source,
        })?;
        return Ok(EntityDirectory::from_code_list_csv(&raw)?);
    }

    let cached = cached_code_list_path(&settings.cache_dir);
    if is_fresh(&cached, CODE_LIST_MAX_AGE) {
        match read_cached(&cached) {
            Ok(issuers) => {
                log::debug!("Using cached code list ({} issuers)", issuers.len());
                return Ok(EntityDirectory::new(issuers));
            }
            Err(e) => log::warn!("Ignoring cached code list: {}", e),
        }
    }

    log::info!("Downloading the EDINET code list");
    let issuers = client.fetch_code_list().await?.into_issuers();
    if let Err(e) = write_cached(&cached, &issuers) {
        log::warn!("Failed to cache the code list: {}", e);
    }
    Ok(EntityDirectory::new(issuers))
}

fn is_fresh(path: &Path, max_age: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age <= max_age)
}

pub(crate) fn read_cached(path: &Path) -> Result<Vec<Issuer>, CodeListError> {
    let raw = std::fs::read(path).map_err(|source| CodeListError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

pub(crate) fn write_cached(path: &Path, issuers: &[Issuer]) -> Result<(), CodeListError> {
    let io = |source| CodeListError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    std::fs::write(path, serde_json::to_vec(issuers)?).map_err(io)
}
