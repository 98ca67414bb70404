use anyhow::Result;

use crate::commands::CommandReport;
use crate::papersort::audit;
use crate::papersort::cache::MetadataCache;
use crate::papersort::paths::resolve_paths;

/// Drops one cache record. The docstore copy is left alone; the next `file`
/// run classifies the document again.
pub fn run(sha256: &str) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("forget");
    let hash = sha256.trim().to_ascii_lowercase();

    let mut cache = MetadataCache::open(&paths.cache_file)?;
    let display = cache
        .get_by_hash(&hash)
        .and_then(|r| r.dst_uri_display.clone().or_else(|| r.original_filename.clone()));
    if cache.delete(&hash)? {
        let message = format!(
            "forgot {hash} ({})",
            display.as_deref().unwrap_or("never filed")
        );
        audit::record(&paths, "forget", "ok", &message);
        report.detail(message);
    } else {
        report.issue(format!("no cached record for {hash}"));
    }
    Ok(report)
}
