use anyhow::Result;

use crate::commands::{CommandReport, load_layout, open_docstore};
use crate::papersort::config::load_config;

pub fn run() -> Result<CommandReport> {
    let cfg = load_config()?;
    let mut report = CommandReport::new("show-layout");

    let docstore = open_docstore(&cfg)?;
    let layout = load_layout(docstore.as_ref())?;

    for line in layout.render().lines() {
        report.detail(line.to_string());
    }
    report.detail(format!("leaf_folders={}", layout.leaf_paths().len()));
    let parents = layout.wildcard_parents();
    if !parents.is_empty() {
        report.detail(format!("company_locations={}", parents.join(", ")));
    }
    Ok(report)
}
