use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "papersort",
    version,
    about = "File PDFs into a layout-constrained docstore"
)]
struct Cli {
    /// Print the report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze inbox documents and optionally file them into the docstore.
    File {
        /// Inbox URI (overrides INBOX), e.g. local:/scans
        #[arg(long, conflicts_with = "file")]
        inbox: Option<String>,
        /// Process a single local PDF instead of an inbox.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Re-classify documents even if they are cached.
        #[arg(long)]
        update: bool,
        /// Place documents into the docstore.
        #[arg(long)]
        copy: bool,
        /// Check that filed documents still exist; re-copy if missing.
        #[arg(long, requires = "copy")]
        verify: bool,
        /// Append an entry per file to the docstore ingress log.
        #[arg(long)]
        log: bool,
    },
    /// Find and merge company folders that name the same entity.
    Dedupe {
        /// Merge without asking.
        #[arg(long)]
        yes: bool,
    },
    /// Print the parsed docstore layout.
    ShowLayout,
    /// Check whether a filing path is valid in the layout.
    CheckPath { path: String },
    /// Reconcile the metadata cache with the docstore contents.
    Repair,
    /// Remove one document's record from the metadata cache.
    Forget {
        /// Content hash (sha256 hex) of the document.
        hash: String,
    },
    /// Show resolved paths, configuration and recognised env keys.
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}: {}", report.command, if report.ok { "ok" } else { "failed" });
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger();

    let report = match cli.command {
        Command::File {
            inbox,
            file,
            update,
            copy,
            verify,
            log,
        } => commands::file::run(&commands::file::FileOptions {
            inbox,
            file,
            update,
            copy,
            verify,
            log,
        })?,
        Command::Dedupe { yes } => commands::dedupe::run(yes)?,
        Command::ShowLayout => commands::show_layout::run()?,
        Command::CheckPath { path } => commands::check_path::run(&path)?,
        Command::Repair => commands::repair::run()?,
        Command::Forget { hash } => commands::forget::run(&hash)?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verify_requires_copy() {
        assert!(Cli::try_parse_from(["papersort", "file", "--verify"]).is_err());
        assert!(Cli::try_parse_from(["papersort", "file", "--copy", "--verify"]).is_ok());
        assert!(
            Cli::try_parse_from(["papersort", "file", "--inbox", "local:/x", "--file", "a.pdf"])
                .is_err()
        );
    }
}
