use anyhow::Result;

use crate::commands::{CommandReport, confirm_on_stdin, load_layout, open_classifier, open_docstore};
use crate::papersort::audit;
use crate::papersort::config::load_config;
use crate::papersort::dedupe::{MergeProposal, deduplicate};
use crate::papersort::paths::resolve_paths;

fn question(p: &MergeProposal) -> String {
    format!(
        "Merge '{}' ({} file(s)) into '{}' ({} file(s))?",
        p.source, p.source_files, p.dest, p.dest_files
    )
}

pub fn run(assume_yes: bool) -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("dedupe");

    let docstore = open_docstore(&cfg)?;
    let layout = load_layout(docstore.as_ref())?;
    let classifier = open_classifier(&cfg)?;

    let mut confirm = |proposal: &MergeProposal| {
        if assume_yes {
            tracing::info!("{}", question(proposal));
            return true;
        }
        confirm_on_stdin(&question(proposal))
    };
    let summary = deduplicate(docstore.as_ref(), classifier.as_ref(), &layout, &mut confirm);

    report.detail(format!(
        "locations={} merged={} files_moved={} declined={} failed={}",
        summary.locations, summary.merged, summary.files_moved, summary.declined, summary.failed
    ));
    for line in &summary.details {
        if line.starts_with("merged ") {
            audit::record(&paths, "dedupe", "ok", line);
        }
        report.detail(line.clone());
    }
    if summary.failed > 0 {
        audit::record(&paths, "dedupe", "failed", "merge aborted; both folders left in place");
        report.issue(format!(
            "{} merge(s) aborted; both folders were left for manual inspection",
            summary.failed
        ));
    }
    Ok(report)
}
