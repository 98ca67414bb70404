use anyhow::Result;

use crate::classifier::OfflineClassifier;
use crate::commands::{CommandReport, build_context};
use crate::papersort::audit;
use crate::papersort::config::load_config;
use crate::papersort::filing::RunOptions;
use crate::papersort::paths::resolve_paths;
use crate::papersort::repair::{DUPLICATE_FOLDER, repair_cache};

pub fn run() -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("repair");

    // Repair only hashes and moves; it never asks the classifier anything.
    let mut ctx = build_context(&cfg, &paths, Box::new(OfflineClassifier), RunOptions::default())?;
    report.detail(format!("docstore={}", ctx.docstore.display_name()));
    report.detail(format!("cache={}", ctx.cache.path().display()));

    let summary = repair_cache(&mut ctx)?;
    report.detail(format!(
        "scanned={} repaired={} duplicates_moved={} duplicates_skipped={} uncached={} failed={}",
        summary.scanned,
        summary.repaired,
        summary.duplicates_moved,
        summary.duplicates_skipped,
        summary.uncached,
        summary.failed
    ));
    for line in &summary.details {
        if line.contains(DUPLICATE_FOLDER) && line.contains("moved") {
            audit::record(&paths, "repair", "ok", line);
        }
        report.detail(line.clone());
    }

    if summary.duplicates_skipped > 0 {
        report.issue(format!(
            "{} duplicate(s) need manual review",
            summary.duplicates_skipped
        ));
    }
    if summary.failed > 0 {
        report.issue(format!("{} file(s) could not be checked", summary.failed));
    }
    Ok(report)
}
