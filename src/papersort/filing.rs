//! The per-file pipeline: hash, consult the cache, classify when needed,
//! place the document, log it. Batches keep going past per-file failures.

use crate::classifier::{AnalysisRequest, Classifier, DocumentAnalysis};
use crate::error::{FilingStage, PaperSortError};
use crate::papersort::cache::MetadataCache;
use crate::papersort::config::DEFAULT_FALLBACK_FOLDER;
use crate::papersort::destination::{self, Placement, ResolveOutcome};
use crate::papersort::ingress_log::{self, IngressEntry, IngressStatus};
use crate::papersort::layout::Layout;
use crate::papersort::metadata::FileMetadata;
use crate::papersort::util::sha256_file;
use crate::papersort::warn::{WarnEvent, emit};
use crate::storage::StorageDriver;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use thiserror::Error;

const FALLBACK_SUMMARY: &str = "Document could not be automatically classified.";
const FALLBACK_TITLE: &str = "Document";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Ignore cached analysis and classify again.
    pub update: bool,
    /// Place documents into the docstore.
    pub copy: bool,
    /// Check that already-filed documents still exist.
    pub verify: bool,
    /// Append an ingress log entry per file.
    pub log: bool,
    pub fallback_folder: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            update: false,
            copy: false,
            verify: false,
            log: false,
            fallback_folder: DEFAULT_FALLBACK_FOLDER.to_string(),
        }
    }
}

/// Everything a filing or maintenance run needs.
pub struct FilingContext {
    pub docstore: Box<dyn StorageDriver>,
    pub cache: MetadataCache,
    pub classifier: Box<dyn Classifier>,
    pub layout: Layout,
    pub options: RunOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub locator: String,
    pub display: String,
    pub filename: String,
}

impl SourceRef {
    pub fn from_driver(driver: &dyn StorageDriver, path: &str) -> Self {
        Self {
            locator: driver.locator(path),
            display: driver.display_path(path),
            filename: crate::storage::file_name(path).to_string(),
        }
    }

    /// A file given directly on the command line.
    pub fn local_file(path: &Path) -> Self {
        Self {
            locator: format!("local::{}", path.display()),
            display: path.display().to_string(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOrigin {
    Cached,
    Analyzed,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFile {
    pub record: FileMetadata,
    pub origin: AnalysisOrigin,
    pub path_valid: bool,
    pub placement: Option<ResolveOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped { reason: String },
    Processed(ProcessedFile),
}

#[derive(Debug, Error)]
#[error("{} failed: {:#}", .stage.as_str(), .error)]
pub struct FileFailure {
    pub stage: FilingStage,
    pub hash: Option<String>,
    pub error: anyhow::Error,
}

fn failed(stage: FilingStage, hash: Option<&str>) -> impl FnOnce(anyhow::Error) -> FileFailure {
    let hash = hash.map(str::to_string);
    move |error| FileFailure { stage, hash, error }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub seen: usize,
    pub cached: usize,
    pub analyzed: usize,
    pub fallback: usize,
    pub filed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub details: Vec<String>,
}

impl BatchSummary {
    fn tally(&mut self, source: &SourceRef, result: &Result<FileOutcome, FileFailure>) {
        self.seen += 1;
        match result {
            Ok(FileOutcome::Skipped { reason }) => {
                self.skipped += 1;
                self.details.push(format!("skipped {}: {reason}", source.filename));
            }
            Ok(FileOutcome::Processed(done)) => {
                let label = match done.origin {
                    AnalysisOrigin::Cached => {
                        self.cached += 1;
                        "cached"
                    }
                    AnalysisOrigin::Analyzed => {
                        self.analyzed += 1;
                        "analyzed"
                    }
                    AnalysisOrigin::Fallback => {
                        self.fallback += 1;
                        "unsortable"
                    }
                };
                self.details.push(format!("{label}: {}", source.display));
                self.details
                    .extend(done.record.display_lines().into_iter().map(|l| format!("  {l}")));
                if let Some(path) = &done.record.suggested_path {
                    let mark = if done.path_valid { "exists" } else { "does not exist" };
                    self.details.push(format!("  path '{path}' {mark} in layout"));
                }
                if let Some(placement) = &done.placement {
                    if matches!(
                        placement,
                        ResolveOutcome::Copied(_)
                            | ResolveOutcome::Moved { .. }
                            | ResolveOutcome::Recopied(_)
                    ) {
                        self.filed += 1;
                    }
                    self.details.push(format!("  {}", placement.describe()));
                }
            }
            Err(failure) => {
                self.failed += 1;
                self.details
                    .push(format!("failed {}: {failure}", source.display));
            }
        }
    }
}

/// Analysis used when the classifier gives up: title from the file name,
/// filed under the fallback folder.
pub fn fallback_analysis(filename: &str, fallback_folder: &str) -> DocumentAnalysis {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let title = stem
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    DocumentAnalysis {
        title: if title.is_empty() {
            FALLBACK_TITLE.to_string()
        } else {
            title
        },
        suggested_path: fallback_folder.to_string(),
        confidence: 0,
        year: None,
        date: None,
        entity: None,
        summary: FALLBACK_SUMMARY.to_string(),
    }
}

fn observation(hash: &str, source: &SourceRef, size: u64) -> FileMetadata {
    FileMetadata {
        original_filename: Some(source.filename.clone()),
        file_size: Some(size),
        src_uri: Some(source.locator.clone()),
        src_uri_display: Some(source.display.clone()),
        ..FileMetadata::new(hash)
    }
}

fn with_analysis(base: FileMetadata, analysis: DocumentAnalysis) -> FileMetadata {
    FileMetadata {
        title: Some(analysis.title),
        entity: analysis.entity,
        summary: Some(analysis.summary),
        confidence: Some(analysis.confidence),
        reporting_year: analysis.year,
        document_date: analysis.date,
        suggested_path: Some(analysis.suggested_path),
        ..base
    }
}

fn is_usable(record: &FileMetadata) -> bool {
    record.title.as_deref().is_some_and(|t| !t.trim().is_empty())
        && record
            .suggested_path
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
}

fn file_document(
    ctx: &mut FilingContext,
    local_path: &Path,
    source: &SourceRef,
) -> Result<FileOutcome, FileFailure> {
    let size = fs::metadata(local_path)
        .with_context(|| format!("failed to stat {}", local_path.display()))
        .map_err(failed(FilingStage::Download, None))?
        .len();
    if size == 0 {
        tracing::info!("skipping empty file: {}", source.filename);
        return Ok(FileOutcome::Skipped {
            reason: "empty file".to_string(),
        });
    }

    let hash = sha256_file(local_path).map_err(failed(FilingStage::Hash, None))?;
    if let Some(prior) = ctx.cache.get_by_src(&source.locator)
        && prior.sha256 != hash
    {
        tracing::info!("{} changed since it was last seen", source.filename);
    }
    let cached = ctx.cache.get_by_hash(&hash).filter(|r| is_usable(r)).cloned();
    let seen = observation(&hash, source, size);

    let (record, origin) = match cached {
        Some(_) if !ctx.options.update => {
            tracing::info!("cached: {}", source.filename);
            (seen, AnalysisOrigin::Cached)
        }
        existing => {
            tracing::info!("processing: {}", source.filename);
            let layout = &ctx.layout;
            let hint = existing
                .as_ref()
                .and_then(|r| r.suggested_path.clone())
                .unwrap_or_default();
            let request = AnalysisRequest {
                pdf_path: local_path,
                layout_text: layout.text(),
                hint: &hint,
                inbox_path: &source.display,
            };
            match ctx
                .classifier
                .analyze_document(&request, &|path| layout.path_exists(path))
            {
                Some(analysis) => (with_analysis(seen, analysis), AnalysisOrigin::Analyzed),
                None if existing.is_some() => {
                    warn_unclassified(ctx.classifier.as_ref(), source, &hash, "keep-cached");
                    (seen, AnalysisOrigin::Cached)
                }
                None => {
                    warn_unclassified(ctx.classifier.as_ref(), source, &hash, "fallback-folder");
                    let fallback = fallback_analysis(&source.filename, &ctx.options.fallback_folder);
                    (with_analysis(seen, fallback), AnalysisOrigin::Fallback)
                }
            }
        }
    };

    let record = ctx
        .cache
        .save(&record)
        .map_err(failed(FilingStage::Cache, Some(hash.as_str())))?;

    let suggested = record.suggested_path.clone().unwrap_or_default();
    let path_valid = ctx.layout.path_exists(&suggested);

    let placement = match (&record.title, ctx.options.copy) {
        (Some(title), true) if !suggested.is_empty() => {
            let placement = Placement {
                sha256: &hash,
                local_path,
                title,
                year: record.reporting_year,
                suggested_path: &suggested,
                verify: ctx.options.verify,
            };
            let outcome = destination::resolve(
                ctx.docstore.as_ref(),
                &mut ctx.cache,
                &ctx.layout,
                ctx.classifier.as_ref(),
                &placement,
            )
            .map_err(failed(FilingStage::Resolve, Some(hash.as_str())))?;
            tracing::info!("{}", outcome.describe());
            Some(outcome)
        }
        _ => None,
    };

    let record = ctx.cache.get_by_hash(&hash).cloned().unwrap_or(record);
    Ok(FileOutcome::Processed(ProcessedFile {
        record,
        origin,
        path_valid,
        placement,
    }))
}

fn log_result(
    ctx: &FilingContext,
    source: &SourceRef,
    result: &Result<FileOutcome, FileFailure>,
) {
    let at = chrono::Local::now().naive_local();
    let (entry, hash) = match result {
        Ok(FileOutcome::Skipped { reason }) => (
            IngressEntry {
                at,
                status: IngressStatus::Skipped,
                source: source.display.clone(),
                dest: None,
                summary: reason.clone(),
                error: None,
            },
            None,
        ),
        Ok(FileOutcome::Processed(done)) => {
            let status = match (done.origin, &done.placement) {
                (AnalysisOrigin::Fallback, _) => IngressStatus::Unsortable,
                (_, Some(_)) => IngressStatus::Filed,
                (AnalysisOrigin::Cached, None) => IngressStatus::Cached,
                (AnalysisOrigin::Analyzed, None) => IngressStatus::Analyzed,
            };
            (
                IngressEntry {
                    at,
                    status,
                    source: source.display.clone(),
                    dest: done.placement.as_ref().map(|p| p.path().to_string()),
                    summary: done.record.summary.clone().unwrap_or_default(),
                    error: None,
                },
                Some(done.record.sha256.as_str()),
            )
        }
        Err(failure) => (
            IngressEntry {
                at,
                status: IngressStatus::Error,
                source: source.display.clone(),
                dest: None,
                summary: String::new(),
                error: Some(format!("{failure}")),
            },
            failure.hash.as_deref(),
        ),
    };
    ingress_log::record(ctx.docstore.as_ref(), &entry, hash);
}

fn warn_unclassified(classifier: &dyn Classifier, source: &SourceRef, hash: &str, action: &str) {
    let err = PaperSortError::ClassificationFailure(format!(
        "{} returned no usable analysis",
        classifier.name()
    ))
    .to_string();
    emit(WarnEvent {
        code: "CLASSIFY_FAILED",
        stage: FilingStage::Classify.as_str(),
        action,
        file: &source.display,
        hash,
        retry: "--update",
        reason: "classifier unavailable or output rejected",
        err: &err,
    });
}

fn warn_failure(source: &SourceRef, failure: &FileFailure) {
    let err = format!("{:#}", failure.error);
    emit(WarnEvent {
        code: "FILE_FAILED",
        stage: failure.stage.as_str(),
        action: "skip-file",
        file: &source.display,
        hash: failure.hash.as_deref().unwrap_or_default(),
        retry: "next-run",
        reason: "per-file failure",
        err: &err,
    });
}

/// Processes one document already on local disk.
pub fn process_file(
    ctx: &mut FilingContext,
    local_path: &Path,
    source: &SourceRef,
) -> Result<FileOutcome, FileFailure> {
    let result = file_document(ctx, local_path, source);
    if let Err(failure) = &result {
        warn_failure(source, failure);
    }
    if ctx.options.log {
        log_result(ctx, source, &result);
    }
    result
}

/// Files every PDF under the inbox root, one at a time.
pub fn process_inbox(ctx: &mut FilingContext, inbox: &dyn StorageDriver) -> Result<BatchSummary> {
    let files = inbox
        .list_files("", true, Some(".pdf"))
        .with_context(|| format!("failed to list inbox {}", inbox.display_name()))?;
    tracing::info!("found {} PDF file(s) in {}", files.len(), inbox.display_name());

    let mut summary = BatchSummary::default();
    for file in files {
        let source = SourceRef::from_driver(inbox, &file.path);
        let result = match inbox.download_to_local(&file.path) {
            Ok(local) => process_file(ctx, local.path(), &source),
            Err(err) => {
                let failure = FileFailure {
                    stage: FilingStage::Download,
                    hash: None,
                    error: anyhow::Error::new(err),
                };
                warn_failure(&source, &failure);
                let result = Err(failure);
                if ctx.options.log {
                    log_result(ctx, &source, &result);
                }
                result
            }
        };
        summary.tally(&source, &result);
    }
    Ok(summary)
}

pub fn process_single(ctx: &mut FilingContext, path: &Path) -> Result<BatchSummary> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    if !abs.is_file() {
        bail!("file not found: {}", abs.display());
    }
    let source = SourceRef::local_file(&abs);
    let mut summary = BatchSummary::default();
    let result = process_file(ctx, &abs, &source);
    summary.tally(&source, &result);
    Ok(summary)
}
