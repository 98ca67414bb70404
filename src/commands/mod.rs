pub mod check_path;
pub mod dedupe;
pub mod file;
pub mod forget;
pub mod repair;
pub mod show_layout;
pub mod status;

use crate::classifier::{Classifier, create_classifier};
use crate::papersort::cache::MetadataCache;
use crate::papersort::config::PaperSortConfig;
use crate::papersort::filing::{FilingContext, RunOptions};
use crate::papersort::layout::Layout;
use crate::papersort::paths::PaperSortPaths;
use crate::storage::{StorageDriver, create_storage};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{self, BufRead, Write};

/// Layout description file at the docstore root.
pub const LAYOUT_FILE: &str = "layout.txt";

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn merge(&mut self, mut other: CommandReport) {
        self.ok &= other.ok;
        self.details.append(&mut other.details);
        self.issues.append(&mut other.issues);
    }
}

pub fn open_docstore(cfg: &PaperSortConfig) -> Result<Box<dyn StorageDriver>> {
    let uri = cfg
        .docstore
        .as_deref()
        .context("no docstore configured; set DOCSTORE (e.g. local:/path/to/docs)")?;
    create_storage(uri, cfg.retry.policy())
        .with_context(|| format!("failed to open docstore {uri}"))
}

pub fn load_layout(docstore: &dyn StorageDriver) -> Result<Layout> {
    let text = docstore
        .read_text(LAYOUT_FILE)
        .with_context(|| format!("failed to read {}", docstore.display_path(LAYOUT_FILE)))?;
    Ok(Layout::parse(&text)?)
}

pub fn open_classifier(cfg: &PaperSortConfig) -> Result<Box<dyn Classifier>> {
    create_classifier(&cfg.llm, cfg.retry.policy())
        .with_context(|| format!("failed to set up {} classifier", cfg.llm.provider))
}

pub fn build_context(
    cfg: &PaperSortConfig,
    paths: &PaperSortPaths,
    classifier: Box<dyn Classifier>,
    options: RunOptions,
) -> Result<FilingContext> {
    let docstore = open_docstore(cfg)?;
    let layout = load_layout(docstore.as_ref())?;
    let cache = MetadataCache::open(&paths.cache_file)?;
    Ok(FilingContext {
        docstore,
        cache,
        classifier,
        layout,
        options,
    })
}

/// Asks a yes/no question on the terminal; anything but `y`/`yes` is no.
pub fn confirm_on_stdin(question: &str) -> bool {
    print!("{question} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
