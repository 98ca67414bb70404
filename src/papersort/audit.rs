//! Local journal of docstore mutations, one JSON object per line.

use crate::papersort::paths::PaperSortPaths;
use crate::papersort::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

pub const AUDIT_FILE: &str = "audit.log";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub command: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(
    paths: &PaperSortPaths,
    command: &str,
    status: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        command: command.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.logs_dir.join(AUDIT_FILE);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Best effort; a journal failure never fails the command.
pub fn record(paths: &PaperSortPaths, command: &str, status: &str, message: &str) {
    if let Err(err) = append_event(paths, command, status, message) {
        tracing::warn!("audit log write failed: {err:#}");
    }
}
