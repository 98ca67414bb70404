//! Merges leaf folders that name the same entity, one confirmed pair at a
//! time.

use crate::classifier::Classifier;
use crate::error::PaperSortError;
use crate::papersort::folder_match::gather_leaf_folders;
use crate::papersort::layout::Layout;
use crate::storage::{StorageDriver, join_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeProposal {
    pub location: String,
    /// Full path of the folder that will be emptied and removed.
    pub source: String,
    pub source_files: usize,
    pub dest: String,
    pub dest_files: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeSummary {
    pub locations: usize,
    pub merged: usize,
    pub files_moved: usize,
    pub declined: usize,
    pub failed: usize,
    pub details: Vec<String>,
}

fn count_files(driver: &dyn StorageDriver, folder: &str) -> usize {
    driver
        .list_files(folder, false, None)
        .map(|files| files.len())
        .unwrap_or(0)
}

/// Moves every file of `source` into `dest`, then deletes `source`. Nothing
/// is moved if any file name is already taken in `dest`. Stops at the first
/// failure and leaves the source folder in place.
pub fn merge_folders(
    driver: &dyn StorageDriver,
    source: &str,
    dest: &str,
) -> Result<usize, PaperSortError> {
    let aborted = |moved: usize, reason: String| PaperSortError::MergeAborted {
        source_folder: source.to_string(),
        dest_folder: dest.to_string(),
        moved,
        reason,
    };

    let files = driver
        .list_files(source, false, None)
        .map_err(|err| aborted(0, err.to_string()))?;
    for file in &files {
        let target = join_path(dest, &file.name);
        match driver.file_exists(&target) {
            Ok(false) => {}
            Ok(true) => return Err(aborted(0, format!("{target} already exists"))),
            Err(err) => return Err(aborted(0, format!("cannot check {target}: {err}"))),
        }
    }

    let mut moved = 0usize;
    for file in &files {
        driver
            .move_file(&file.path, dest)
            .map_err(|err| aborted(moved, format!("{}: {err}", file.name)))?;
        moved += 1;
        tracing::debug!("moved {} -> {dest}", file.path);
    }
    driver
        .delete(source)
        .map_err(|err| aborted(moved, format!("delete failed: {err}")))?;
    Ok(moved)
}

/// Scans every `By company` location for duplicate folders. `confirm` is
/// asked before each merge; a declined or failed merge ends the scan of that
/// location for this run.
pub fn deduplicate(
    driver: &dyn StorageDriver,
    classifier: &dyn Classifier,
    layout: &Layout,
    confirm: &mut dyn FnMut(&MergeProposal) -> bool,
) -> DedupeSummary {
    let mut summary = DedupeSummary::default();
    let locations = layout.wildcard_parents();
    summary.locations = locations.len();

    for location in &locations {
        let mut rounds = 0usize;
        loop {
            let leaves = gather_leaf_folders(driver, location);
            if leaves.len() < 2 {
                summary
                    .details
                    .push(format!("{location}: {} folder(s), nothing to compare", leaves.len()));
                break;
            }
            // Every merge removes a folder, so this bounds a misbehaving classifier.
            if rounds >= leaves.len() {
                break;
            }
            rounds += 1;

            let names: Vec<String> = leaves.keys().cloned().collect();
            let Some((first, second)) = classifier.find_duplicate_pair(&names) else {
                summary.details.push(format!("{location}: no duplicates"));
                break;
            };
            let (Some(first_parent), Some(second_parent)) = (leaves.get(&first), leaves.get(&second))
            else {
                break;
            };
            let first_path = join_path(first_parent, &first);
            let second_path = join_path(second_parent, &second);
            let first_files = count_files(driver, &first_path);
            let second_files = count_files(driver, &second_path);

            let proposal = if second_files > first_files {
                MergeProposal {
                    location: location.clone(),
                    source: first_path,
                    source_files: first_files,
                    dest: second_path,
                    dest_files: second_files,
                }
            } else {
                MergeProposal {
                    location: location.clone(),
                    source: second_path,
                    source_files: second_files,
                    dest: first_path,
                    dest_files: first_files,
                }
            };

            if !confirm(&proposal) {
                summary.declined += 1;
                summary
                    .details
                    .push(format!("skipped merge '{}' -> '{}'", proposal.source, proposal.dest));
                break;
            }

            match merge_folders(driver, &proposal.source, &proposal.dest) {
                Ok(moved) => {
                    summary.merged += 1;
                    summary.files_moved += moved;
                    summary.details.push(format!(
                        "merged '{}' -> '{}' ({moved} file(s))",
                        proposal.source, proposal.dest
                    ));
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!("{err}");
                    summary.details.push(err.to_string());
                    break;
                }
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::papersort::folder_match::tests::ScriptedClassifier;
    use crate::papersort::retry::RetryPolicy;
    use crate::storage::{DownloadedFile, FileInfo, FolderInfo, LocalDriver, StorageError};
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;

    /// Local driver whose n-th move fails.
    struct FailingMoves {
        inner: LocalDriver,
        fail_at: usize,
        moves: Cell<usize>,
    }

    impl StorageDriver for FailingMoves {
        fn scheme(&self) -> &'static str {
            self.inner.scheme()
        }
        fn root_id(&self) -> String {
            self.inner.root_id()
        }
        fn display_name(&self) -> String {
            self.inner.display_name()
        }
        fn list_files(
            &self,
            path: &str,
            recursive: bool,
            extension: Option<&str>,
        ) -> Result<Vec<FileInfo>, StorageError> {
            self.inner.list_files(path, recursive, extension)
        }
        fn list_folders(&self, path: &str) -> Result<Vec<FolderInfo>, StorageError> {
            self.inner.list_folders(path)
        }
        fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
            self.inner.file_exists(path)
        }
        fn read_text(&self, path: &str) -> Result<String, StorageError> {
            self.inner.read_text(path)
        }
        fn download_to_local(&self, path: &str) -> Result<DownloadedFile, StorageError> {
            self.inner.download_to_local(path)
        }
        fn move_file(&self, src_path: &str, dest_folder: &str) -> Result<(), StorageError> {
            let n = self.moves.get() + 1;
            self.moves.set(n);
            if n == self.fail_at {
                return Err(StorageError::PermissionDenied(src_path.to_string()));
            }
            self.inner.move_file(src_path, dest_folder)
        }
        fn delete(&self, path: &str) -> Result<(), StorageError> {
            self.inner.delete(path)
        }
    }

    fn seed(root: &Path, folder: &str, count: usize) {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).expect("mkdir");
        for i in 0..count {
            fs::write(dir.join(format!("{i}-{}.pdf", folder.replace('/', "_"))), "pdf")
                .expect("write");
        }
    }

    fn local(root: &Path) -> LocalDriver {
        LocalDriver::open(root)
            .expect("open")
            .with_retry(RetryPolicy::immediate(0))
    }

    fn layout() -> Layout {
        Layout::parse("LAYOUT STARTS HERE\nFinancial\n  Banks\n    By company\n").expect("layout")
    }

    fn scripted(pairs: &[(&str, &str)]) -> ScriptedClassifier {
        ScriptedClassifier {
            duplicate_pairs: std::cell::RefCell::new(
                pairs
                    .iter()
                    .map(|(a, b)| (a.to_string(), b.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn smaller_folder_merges_into_larger_and_is_deleted() {
        let tmp = tempfile::tempdir().expect("tempdir");
        seed(tmp.path(), "Financial/Banks/Chase", 2);
        seed(tmp.path(), "Financial/Banks/Chase Bank", 5);
        seed(tmp.path(), "Financial/Banks/Wells Fargo", 1);
        let driver = local(tmp.path());

        let mut seen = Vec::new();
        let summary = deduplicate(
            &driver,
            &scripted(&[("Chase Bank", "Chase")]),
            &layout(),
            &mut |p| {
                seen.push(p.clone());
                true
            },
        );

        assert_eq!(summary.merged, 1);
        assert_eq!(summary.files_moved, 2);
        assert_eq!(seen[0].source, "Financial/Banks/Chase");
        assert_eq!(seen[0].dest, "Financial/Banks/Chase Bank");
        assert!(!tmp.path().join("Financial/Banks/Chase").exists());
        assert_eq!(count_files(&driver, "Financial/Banks/Chase Bank"), 7);
    }

    #[test]
    fn tie_keeps_first_named_folder() {
        let tmp = tempfile::tempdir().expect("tempdir");
        seed(tmp.path(), "Financial/Banks/GS", 1);
        seed(tmp.path(), "Financial/Banks/Goldman Sachs", 1);
        let driver = local(tmp.path());

        let mut seen = Vec::new();
        deduplicate(&driver, &scripted(&[("GS", "Goldman Sachs")]), &layout(), &mut |p| {
            seen.push(p.clone());
            false
        });
        assert_eq!(seen[0].dest, "Financial/Banks/GS");
        assert_eq!(seen[0].source, "Financial/Banks/Goldman Sachs");
    }

    #[test]
    fn declined_merge_stops_the_location() {
        let tmp = tempfile::tempdir().expect("tempdir");
        seed(tmp.path(), "Financial/Banks/Chase", 1);
        seed(tmp.path(), "Financial/Banks/Chase Bank", 2);
        seed(tmp.path(), "Financial/Banks/GS", 1);
        seed(tmp.path(), "Financial/Banks/Goldman Sachs", 2);
        let driver = local(tmp.path());

        let mut asked = 0;
        let summary = deduplicate(
            &driver,
            &scripted(&[("Chase", "Chase Bank"), ("GS", "Goldman Sachs")]),
            &layout(),
            &mut |_| {
                asked += 1;
                false
            },
        );
        assert_eq!(asked, 1);
        assert_eq!(summary.declined, 1);
        assert_eq!(summary.merged, 0);
        assert!(tmp.path().join("Financial/Banks/Chase").exists());
    }

    #[test]
    fn failed_move_aborts_and_keeps_source() {
        let tmp = tempfile::tempdir().expect("tempdir");
        seed(tmp.path(), "Financial/Banks/Chase", 2);
        seed(tmp.path(), "Financial/Banks/Chase Bank", 5);
        let driver = FailingMoves {
            inner: local(tmp.path()),
            fail_at: 2,
            moves: Cell::new(0),
        };

        let err = merge_folders(&driver, "Financial/Banks/Chase", "Financial/Banks/Chase Bank")
            .expect_err("second move fails");
        assert!(matches!(err, PaperSortError::MergeAborted { moved: 1, .. }));
        assert!(tmp.path().join("Financial/Banks/Chase").exists());
        assert_eq!(count_files(&driver, "Financial/Banks/Chase"), 1);
        assert_eq!(count_files(&driver, "Financial/Banks/Chase Bank"), 6);
    }

    #[test]
    fn name_clash_in_destination_aborts_before_moving() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let banks = tmp.path().join("Financial/Banks");
        fs::create_dir_all(banks.join("Chase")).expect("mkdir");
        fs::create_dir_all(banks.join("Chase Bank")).expect("mkdir");
        fs::write(banks.join("Chase/Statement 2024.pdf"), "from Chase").expect("write");
        fs::write(banks.join("Chase Bank/Statement 2024.pdf"), "from Chase Bank").expect("write");
        fs::write(banks.join("Chase Bank/Other.pdf"), "other").expect("write");
        let driver = local(tmp.path());

        let err = merge_folders(&driver, "Financial/Banks/Chase", "Financial/Banks/Chase Bank")
            .expect_err("name clash");
        assert!(matches!(err, PaperSortError::MergeAborted { moved: 0, .. }));
        assert_eq!(
            fs::read_to_string(banks.join("Chase Bank/Statement 2024.pdf")).expect("read"),
            "from Chase Bank"
        );
        assert!(banks.join("Chase/Statement 2024.pdf").is_file());
        assert_eq!(count_files(&driver, "Financial/Banks/Chase Bank"), 2);
    }

    #[test]
    fn locations_without_folders_are_skipped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let driver = local(tmp.path());
        let summary = deduplicate(&driver, &scripted(&[]), &layout(), &mut |_| true);
        assert_eq!(summary.locations, 1);
        assert_eq!(summary.merged, 0);
    }
}
