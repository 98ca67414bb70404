use anyhow::Result;
use std::env;

use crate::commands::{CommandReport, LAYOUT_FILE, load_layout, open_docstore};
use crate::papersort::cache::{MetadataCache, lock_path};
use crate::papersort::config::{PaperSortConfig, load_config, resolve_config_path};
use crate::papersort::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/papersort_env_allowlist.rs"));

/// Recognised environment keys that are currently set. Values are never
/// reported.
pub fn env_keys_set() -> Vec<&'static str> {
    GENERATED_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some_and(|v| !v.is_empty()))
        .collect()
}

fn config_report(cfg: &PaperSortConfig) -> CommandReport {
    let mut report = CommandReport::new("status");
    report.detail(format!(
        "docstore={}",
        cfg.docstore.as_deref().unwrap_or("(unset)")
    ));
    report.detail(format!("inbox={}", cfg.inbox.as_deref().unwrap_or("(unset)")));
    report.detail(format!("llm_provider={}", cfg.llm.provider));
    if let Some(model) = &cfg.llm.model {
        report.detail(format!("llm_model={model}"));
    }
    report.detail(format!(
        "retry max={} base_ms={} max_delay_ms={}",
        cfg.retry.max_retries, cfg.retry.base_delay_ms, cfg.retry.max_delay_ms
    ));
    report.detail(format!("fallback_folder={}", cfg.filing.fallback_folder));

    if cfg.docstore.is_none() {
        report.issue("no docstore configured (set DOCSTORE)");
        return report;
    }
    match open_docstore(cfg).and_then(|d| load_layout(d.as_ref())) {
        Ok(layout) => report.detail(format!(
            "layout: {} leaf folder(s), {} company location(s)",
            layout.leaf_paths().len(),
            layout.wildcard_parents().len()
        )),
        Err(err) => report.issue(format!("{LAYOUT_FILE} unusable: {err:#}")),
    }
    report
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("papersort_home={}", paths.home.display()));
    report.detail(format!("cache_file={}", paths.cache_file.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config_file={}", path.display())),
        Some(path) => report.detail(format!("config_file={} (absent)", path.display())),
        None => report.detail("config_file=(none)"),
    }

    if paths.cache_file.exists() {
        match MetadataCache::open(&paths.cache_file) {
            Ok(cache) => report.detail(format!("cached_documents={}", cache.len())),
            Err(err) => report.issue(format!(
                "cache unavailable ({}): {err:#}",
                lock_path(&paths.cache_file).display()
            )),
        }
    } else {
        report.detail("cached_documents=0 (no cache yet)");
    }

    match load_config() {
        Ok(cfg) => report.merge(config_report(&cfg)),
        Err(err) => report.issue(format!("config invalid: {err:#}")),
    }

    let keys = env_keys_set();
    if keys.is_empty() {
        report.detail("env_keys_set=(none)");
    } else {
        report.detail(format!("env_keys_set={}", keys.join(",")));
    }
    Ok(report)
}
