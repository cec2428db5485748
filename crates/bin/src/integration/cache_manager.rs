//! Filing cache location and reporting.

use yuho::Settings;
use yuho_data::FilingCache;
use yuho_data::error::DataError;

/// Open the filing cache configured by `settings`, creating its directory.
pub(crate) fn open_cache(settings: &Settings) -> Result<FilingCache, DataError> {
    FilingCache::new(&settings.cache_dir, settings.cache_ttl())
}

/// Print the cache location and its contents.
pub(crate) fn print_cache_info(cache: &FilingCache) -> Result<(), DataError> {
    let stats = cache.stats()?;
    println!("  Cache location: {}", cache.dir().display());
    println!("  TTL: {} hours", cache.ttl().num_hours());
    println!(
        "  Cached filings: {} ({} bytes, {} expired, {} unreadable)",
        stats.entries, stats.bytes, stats.expired, stats.corrupt
    );
    for entry in cache.entries()? {
        println!(
            "    {:<28} {:<10} {:<10} fetched {}{}",
            entry.key.file_name(),
            entry.document_id,
            if entry.is_correction {
                "amended"
            } else {
                "original"
            },
            entry.fetched_at.format("%Y-%m-%d %H:%M"),
            if entry.expired { " (expired)" } else { "" }
        );
    }
    Ok(())
}
