use anyhow::Result;

use crate::commands::{CommandReport, load_layout, open_docstore};
use crate::papersort::config::load_config;

pub fn run(path: &str) -> Result<CommandReport> {
    let cfg = load_config()?;
    let mut report = CommandReport::new("check-path");

    let docstore = open_docstore(&cfg)?;
    let layout = load_layout(docstore.as_ref())?;

    if layout.path_exists(path) {
        report.detail(format!("path '{path}' exists in layout"));
    } else {
        report.issue(format!("path '{path}' does not exist in layout"));
    }
    Ok(report)
}
