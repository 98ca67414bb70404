//! Reconciles the metadata cache with what is physically in the docstore.

use crate::error::FilingStage;
use crate::papersort::filing::FilingContext;
use crate::papersort::util::sha256_file;
use crate::papersort::warn::{WarnEvent, emit};
use crate::storage::{StorageDriver, file_name, join_path, parent_folder};
use anyhow::{Context, Result};

pub const DUPLICATE_FOLDER: &str = "--Duplicate";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub scanned: usize,
    pub repaired: usize,
    pub duplicates_moved: usize,
    pub duplicates_skipped: usize,
    pub uncached: usize,
    pub failed: usize,
    pub details: Vec<String>,
}

/// Folders such as `--Duplicate` and `--IncomingLog` are bookkeeping, not
/// filed documents.
pub fn in_system_folder(path: &str) -> bool {
    path.split('/').any(|part| part.starts_with("--"))
}

fn move_to_duplicates(driver: &dyn StorageDriver, path: &str) -> Result<()> {
    let target = join_path(DUPLICATE_FOLDER, file_name(path));
    if driver.file_exists(&target)? {
        anyhow::bail!("{target} already exists");
    }
    driver
        .move_file(path, DUPLICATE_FOLDER)
        .with_context(|| format!("failed to move {path} to {DUPLICATE_FOLDER}"))
}

pub fn repair_cache(ctx: &mut FilingContext) -> Result<RepairSummary> {
    let driver = ctx.docstore.as_ref();
    let files = driver
        .list_files("", true, Some(".pdf"))
        .with_context(|| format!("failed to list docstore {}", driver.display_name()))?;
    let files: Vec<_> = files
        .into_iter()
        .filter(|f| !in_system_folder(&f.path))
        .collect();
    tracing::info!("found {} PDF file(s) outside system folders", files.len());

    let mut summary = RepairSummary::default();
    for file in &files {
        summary.scanned += 1;
        let scan_path = file.path.as_str();

        let hash = match driver
            .download_to_local(scan_path)
            .map_err(anyhow::Error::new)
            .and_then(|local| sha256_file(local.path()))
        {
            Ok(hash) => hash,
            Err(err) => {
                summary.failed += 1;
                let err = format!("{err:#}");
                emit(WarnEvent {
                    code: "REPAIR_HASH_FAILED",
                    stage: FilingStage::Repair.as_str(),
                    action: "skip-file",
                    file: scan_path,
                    reason: "cannot read docstore file",
                    err: &err,
                    ..WarnEvent::default()
                });
                summary.details.push(format!("{scan_path}: error {err}"));
                continue;
            }
        };

        let Some(existing) = ctx.cache.get_by_hash(&hash).cloned() else {
            summary.uncached += 1;
            summary
                .details
                .push(format!("{scan_path}: not in cache (needs processing)"));
            continue;
        };

        let mark = |cache: &mut crate::papersort::cache::MetadataCache| {
            cache.mark_copied(&hash, &driver.locator(scan_path), &driver.display_path(scan_path))
        };

        let Some(recorded) = existing.dst_path().map(str::to_string) else {
            mark(&mut ctx.cache)?;
            summary.repaired += 1;
            summary
                .details
                .push(format!("{scan_path}: destination was empty, recorded"));
            continue;
        };

        if recorded == scan_path {
            if !existing.copied {
                mark(&mut ctx.cache)?;
                summary.repaired += 1;
                summary.details.push(format!("{scan_path}: fixed copied flag"));
            }
            continue;
        }

        let recorded_exists = match driver.file_exists(&recorded) {
            Ok(found) => found,
            Err(err) => {
                summary.failed += 1;
                summary
                    .details
                    .push(format!("{scan_path}: cannot check {recorded}: {err}"));
                continue;
            }
        };
        if !recorded_exists {
            mark(&mut ctx.cache)?;
            summary.repaired += 1;
            summary
                .details
                .push(format!("{scan_path}: was recorded at {recorded}, updated"));
            continue;
        }

        let suggested = existing.suggested_path.as_deref().map(|p| p.trim_matches('/'));
        let (keep_scan, loser) = match suggested {
            Some(folder) if parent_folder(scan_path) == folder => (true, recorded.as_str()),
            Some(folder) if existing.dst_folder() == Some(folder) => (false, scan_path),
            _ => {
                summary.duplicates_skipped += 1;
                summary.details.push(format!(
                    "{scan_path}: duplicate of {recorded}, manual review needed"
                ));
                continue;
            }
        };

        match move_to_duplicates(driver, loser) {
            Ok(()) => {
                if keep_scan {
                    mark(&mut ctx.cache)?;
                }
                summary.duplicates_moved += 1;
                summary
                    .details
                    .push(format!("{loser}: duplicate moved to {DUPLICATE_FOLDER}"));
            }
            Err(err) => {
                summary.duplicates_skipped += 1;
                summary
                    .details
                    .push(format!("{loser}: duplicate not moved: {err:#}"));
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::OfflineClassifier;
    use crate::papersort::cache::MetadataCache;
    use crate::papersort::filing::RunOptions;
    use crate::papersort::layout::Layout;
    use crate::papersort::metadata::FileMetadata;
    use crate::papersort::retry::RetryPolicy;
    use crate::storage::LocalDriver;
    use std::fs;
    use tempfile::TempDir;

    fn context(tmp: &TempDir) -> FilingContext {
        let store = tmp.path().join("store");
        fs::create_dir_all(&store).expect("mkdir");
        FilingContext {
            docstore: Box::new(
                LocalDriver::open(&store)
                    .expect("open")
                    .with_retry(RetryPolicy::immediate(0)),
            ),
            cache: MetadataCache::open(&tmp.path().join("metadata.json")).expect("cache"),
            classifier: Box::new(OfflineClassifier),
            layout: Layout::parse("LAYOUT STARTS HERE\nFinancial\n  Banking\n  Taxes\n")
                .expect("layout"),
            options: RunOptions::default(),
        }
    }

    fn put(tmp: &TempDir, rel: &str, body: &str) -> String {
        let path = tmp.path().join("store").join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, body).expect("write");
        sha256_file(&path).expect("hash")
    }

    fn cache_record(ctx: &mut FilingContext, hash: &str, suggested: &str, dst: Option<&str>) {
        ctx.cache
            .save(&FileMetadata {
                title: Some("Statement".into()),
                suggested_path: Some(suggested.into()),
                ..FileMetadata::new(hash)
            })
            .expect("save");
        if let Some(dst) = dst {
            let locator = ctx.docstore.locator(dst);
            ctx.cache.mark_copied(hash, &locator, dst).expect("mark");
        }
    }

    fn store_has(tmp: &TempDir, rel: &str) -> bool {
        tmp.path().join("store").join(rel).is_file()
    }

    #[test]
    fn system_folders_are_recognised() {
        assert!(in_system_folder("--Duplicate/a.pdf"));
        assert!(in_system_folder("Financial/--old/a.pdf"));
        assert!(!in_system_folder("Financial/a--b.pdf"));
    }

    #[test]
    fn records_destination_for_uncopied_and_moved_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(&tmp);
        let a = put(&tmp, "Financial/Banking/a.pdf", "a");
        let b = put(&tmp, "Financial/Taxes/b.pdf", "b");
        put(&tmp, "Financial/Taxes/unknown.pdf", "u");
        put(&tmp, "--IncomingLog/ignored.pdf", "x");
        cache_record(&mut ctx, &a, "Financial/Banking", None);
        cache_record(&mut ctx, &b, "Financial/Taxes", Some("Financial/Banking/b.pdf"));

        let summary = repair_cache(&mut ctx).expect("repair");
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.repaired, 2);
        assert_eq!(summary.uncached, 1);

        let a_rec = ctx.cache.get_by_hash(&a).expect("a");
        assert!(a_rec.copied);
        assert_eq!(a_rec.dst_path(), Some("Financial/Banking/a.pdf"));
        let b_rec = ctx.cache.get_by_hash(&b).expect("b");
        assert_eq!(b_rec.dst_path(), Some("Financial/Taxes/b.pdf"));
    }

    #[test]
    fn duplicate_outside_suggested_folder_is_moved_aside() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(&tmp);
        let hash = put(&tmp, "Financial/Banking/s.pdf", "same");
        put(&tmp, "Financial/Taxes/s copy.pdf", "same");
        cache_record(&mut ctx, &hash, "Financial/Banking", Some("Financial/Banking/s.pdf"));

        let summary = repair_cache(&mut ctx).expect("repair");
        assert_eq!(summary.duplicates_moved, 1);
        assert!(store_has(&tmp, "Financial/Banking/s.pdf"));
        assert!(store_has(&tmp, "--Duplicate/s copy.pdf"));
        assert!(!store_has(&tmp, "Financial/Taxes/s copy.pdf"));
        let record = ctx.cache.get_by_hash(&hash).expect("record");
        assert_eq!(record.dst_path(), Some("Financial/Banking/s.pdf"));
    }

    #[test]
    fn duplicate_with_no_preferred_copy_is_left_alone() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(&tmp);
        let hash = put(&tmp, "Financial/Banking/s.pdf", "same");
        put(&tmp, "Financial/Taxes/s.pdf", "same");
        cache_record(&mut ctx, &hash, "Other", Some("Financial/Banking/s.pdf"));

        let summary = repair_cache(&mut ctx).expect("repair");
        assert_eq!(summary.duplicates_skipped, 1);
        assert!(store_has(&tmp, "Financial/Taxes/s.pdf"));
        assert!(!tmp.path().join("store/--Duplicate").exists());
    }
}
