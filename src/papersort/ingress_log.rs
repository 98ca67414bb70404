use crate::error::FilingStage;
use crate::papersort::warn::{WarnEvent, emit};
use crate::storage::{StorageDriver, StorageError};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::io::Write;
use tempfile::NamedTempFile;

pub const LOG_FOLDER: &str = "--IncomingLog/log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressStatus {
    Filed,
    Analyzed,
    Cached,
    Unsortable,
    Skipped,
    Error,
}

impl IngressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filed => "FILED",
            Self::Analyzed => "ANALYZED",
            Self::Cached => "CACHED",
            Self::Unsortable => "UNSORTABLE",
            Self::Skipped => "SKIPPED",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngressEntry {
    pub at: NaiveDateTime,
    pub status: IngressStatus,
    pub source: String,
    pub dest: Option<String>,
    pub summary: String,
    pub error: Option<String>,
}

/// Monthly log file, relative to the docstore root.
pub fn log_path(at: &NaiveDateTime) -> String {
    format!("{LOG_FOLDER}/{}-ingress.log", at.format("%Y-%m"))
}

pub fn format_entry(entry: &IngressEntry) -> String {
    let mut out = format!(
        "[{}] {}\n",
        entry.at.format("%Y-%m-%d %H:%M:%S"),
        entry.status.as_str()
    );
    out.push_str(&format!("  Source: {}\n", entry.source));
    out.push_str(&format!(
        "  Dest:   {}\n",
        entry.dest.as_deref().unwrap_or("(not filed)")
    ));
    out.push_str(&format!("  Summary: {}\n", entry.summary));
    if let Some(error) = &entry.error {
        out.push_str(&format!("  Error: {error}\n"));
    }
    out.push('\n');
    out
}

/// Appends `entry` to this month's log. Storage has no append primitive, so
/// the whole file is read, extended and uploaded again.
pub fn append(driver: &dyn StorageDriver, entry: &IngressEntry) -> Result<()> {
    let path = log_path(&entry.at);
    let existing = match driver.read_text(&path) {
        Ok(text) => text,
        Err(StorageError::NotFound(_)) => String::new(),
        Err(err) => return Err(err).with_context(|| format!("failed to read {path}")),
    };

    let mut tmp = NamedTempFile::new().context("failed to create ingress log temp file")?;
    tmp.write_all(existing.as_bytes())?;
    tmp.write_all(format_entry(entry).as_bytes())?;
    tmp.flush()?;
    driver
        .upload(tmp.path(), &path)
        .with_context(|| format!("failed to upload {path}"))
}

/// Like [`append`], but a failure only produces a warning.
pub fn record(driver: &dyn StorageDriver, entry: &IngressEntry, hash: Option<&str>) {
    if let Err(err) = append(driver, entry) {
        let err = format!("{err:#}");
        emit(WarnEvent {
            code: "INGRESS_LOG_FAILED",
            stage: FilingStage::IngressLog.as_str(),
            action: "continue",
            file: &entry.source,
            hash: hash.unwrap_or_default(),
            reason: "log write failed",
            err: &err,
            ..WarnEvent::default()
        });
    }
}
