use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::commands::{CommandReport, build_context, open_classifier};
use crate::papersort::audit;
use crate::papersort::config::load_config;
use crate::papersort::filing::{BatchSummary, RunOptions, process_inbox, process_single};
use crate::papersort::paths::resolve_paths;
use crate::storage::create_read_only_storage;

#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub inbox: Option<String>,
    pub file: Option<PathBuf>,
    pub update: bool,
    pub copy: bool,
    pub verify: bool,
    pub log: bool,
}

fn summarize(report: &mut CommandReport, summary: BatchSummary) {
    report.detail(format!(
        "seen={} cached={} analyzed={} unsortable={} filed={} skipped={} failed={}",
        summary.seen,
        summary.cached,
        summary.analyzed,
        summary.fallback,
        summary.filed,
        summary.skipped,
        summary.failed
    ));
    for line in summary.details {
        report.detail(line);
    }
    if summary.failed > 0 {
        report.issue(format!(
            "{} file(s) failed; see PAPERSORT_WARN lines",
            summary.failed
        ));
    }
}

pub fn run(opts: &FileOptions) -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("file");

    let options = RunOptions {
        update: opts.update,
        copy: opts.copy,
        verify: opts.verify,
        log: opts.log,
        fallback_folder: cfg.filing.fallback_folder.clone(),
    };
    let classifier = open_classifier(&cfg)?;
    report.detail(format!("classifier={}", classifier.name()));
    let mut ctx = build_context(&cfg, &paths, classifier, options)?;
    report.detail(format!("docstore={}", ctx.docstore.display_name()));

    let summary = if let Some(file) = &opts.file {
        process_single(&mut ctx, file)?
    } else {
        let uri = opts
            .inbox
            .clone()
            .or_else(|| cfg.inbox.clone())
            .context("no inbox configured; set INBOX or pass --inbox (or use --file)")?;
        let inbox = create_read_only_storage(&uri, cfg.retry.policy())
            .with_context(|| format!("failed to open inbox {uri}"))?;
        report.detail(format!("inbox={}", inbox.display_name()));
        process_inbox(&mut ctx, inbox.as_ref())?
    };

    if summary.filed > 0 {
        audit::record(
            &paths,
            "file",
            "ok",
            &format!("placed {} document(s)", summary.filed),
        );
    }
    summarize(&mut report, summary);
    Ok(report)
}
