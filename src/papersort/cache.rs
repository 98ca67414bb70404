//! Persistent content-hash -> [`FileMetadata`] store.
//!
//! The whole map lives in one JSON document. Writes go to a temp file in the
//! same directory that is fsynced and renamed over the old document, so a
//! crash leaves either the previous or the new state on disk.

use crate::papersort::metadata::FileMetadata;
use anyhow::{Context, Result, bail};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct CacheDocument {
    schema_version: u32,
    documents: BTreeMap<String, FileMetadata>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            documents: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct MetadataCache {
    path: PathBuf,
    doc: CacheDocument,
    by_src: HashMap<String, String>,
    by_dst: HashMap<String, String>,
    _lock: File,
}

pub fn lock_path(cache_file: &Path) -> PathBuf {
    cache_file.with_extension("lock")
}

impl MetadataCache {
    /// Opens (or creates) the cache at `path` and takes the single-writer lock.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let lock_file = lock_path(path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_file)
            .with_context(|| format!("failed to open {}", lock_file.display()))?;
        if lock.try_lock_exclusive().is_err() {
            bail!(
                "metadata cache {} is in use by another papersort process",
                path.display()
            );
        }

        let doc = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let parsed: CacheDocument = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            if parsed.schema_version > SCHEMA_VERSION {
                bail!(
                    "metadata cache {} has schema version {} (newest supported: {SCHEMA_VERSION})",
                    path.display(),
                    parsed.schema_version
                );
            }
            parsed
        } else {
            CacheDocument::default()
        };

        let mut cache = Self {
            path: path.to_path_buf(),
            doc,
            by_src: HashMap::new(),
            by_dst: HashMap::new(),
            _lock: lock,
        };
        let records: Vec<FileMetadata> = cache.doc.documents.values().cloned().collect();
        for record in &records {
            cache.index(record);
        }
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.doc.documents.len()
    }

    pub fn get_by_hash(&self, sha256: &str) -> Option<&FileMetadata> {
        self.doc.documents.get(sha256)
    }

    pub fn exists(&self, sha256: &str) -> bool {
        self.doc.documents.contains_key(sha256)
    }

    pub fn get_by_src(&self, src_uri: &str) -> Option<&FileMetadata> {
        self.by_src
            .get(src_uri)
            .and_then(|hash| self.doc.documents.get(hash))
    }

    pub fn get_by_dst(&self, dst_uri: &str) -> Option<&FileMetadata> {
        self.by_dst
            .get(dst_uri)
            .and_then(|hash| self.doc.documents.get(hash))
    }

    /// Merges `record` into whatever is stored under its hash and persists it.
    pub fn save(&mut self, record: &FileMetadata) -> Result<FileMetadata> {
        if record.sha256.is_empty() {
            bail!("cannot cache a record without a content hash");
        }
        let merged = match self.doc.documents.get(&record.sha256) {
            Some(existing) => existing.merge(record),
            None => record.clone(),
        };
        self.replace(merged.clone())?;
        Ok(merged)
    }

    /// Records that the file now lives at `dst_uri`. Inserts a minimal record
    /// if the hash has never been seen.
    pub fn mark_copied(&mut self, sha256: &str, dst_uri: &str, dst_display: &str) -> Result<()> {
        let mut record = self
            .doc
            .documents
            .get(sha256)
            .cloned()
            .unwrap_or_else(|| FileMetadata::new(sha256));
        record.dst_uri = Some(dst_uri.to_string());
        record.dst_uri_display = Some(dst_display.to_string());
        record.copied = true;
        self.replace(record)
    }

    /// Maintenance only; normal filing never forgets a document.
    pub fn delete(&mut self, sha256: &str) -> Result<bool> {
        let Some(previous) = self.doc.documents.remove(sha256) else {
            return Ok(false);
        };
        if let Err(err) = self.persist() {
            self.doc.documents.insert(sha256.to_string(), previous);
            return Err(err);
        }
        self.unindex(&previous);
        Ok(true)
    }

    fn replace(&mut self, record: FileMetadata) -> Result<()> {
        let previous = self
            .doc
            .documents
            .insert(record.sha256.clone(), record.clone());
        if let Err(err) = self.persist() {
            match &previous {
                Some(prev) => {
                    self.doc.documents.insert(prev.sha256.clone(), prev.clone());
                }
                None => {
                    self.doc.documents.remove(&record.sha256);
                }
            }
            return Err(err);
        }
        if let Some(prev) = &previous {
            self.unindex(prev);
        }
        self.index(&record);
        Ok(())
    }

    fn index(&mut self, record: &FileMetadata) {
        if let Some(src) = &record.src_uri {
            self.by_src.insert(src.clone(), record.sha256.clone());
        }
        if let Some(dst) = &record.dst_uri {
            self.by_dst.insert(dst.clone(), record.sha256.clone());
        }
    }

    fn unindex(&mut self, record: &FileMetadata) {
        if let Some(src) = &record.src_uri
            && self.by_src.get(src) == Some(&record.sha256)
        {
            self.by_src.remove(src);
        }
        if let Some(dst) = &record.dst_uri
            && self.by_dst.get(dst) == Some(&record.sha256)
        {
            self.by_dst.remove(dst);
        }
    }

    fn persist(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &self.doc)?;
        tmp.write_all(b"\n")?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysed(hash: &str) -> FileMetadata {
        FileMetadata {
            original_filename: Some("scan.pdf".into()),
            src_uri: Some(format!("local:/inbox:{hash}.pdf")),
            title: Some("Bank Statement".into()),
            reporting_year: Some(2024),
            suggested_path: Some("Financial/Banking".into()),
            ..FileMetadata::new(hash)
        }
    }

    #[test]
    fn save_merges_and_survives_reopen() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("metadata.json");
        {
            let mut cache = MetadataCache::open(&path).expect("open");
            cache.save(&analysed("h1")).expect("save");
            let partial = FileMetadata {
                summary: Some("Monthly".into()),
                ..FileMetadata::new("h1")
            };
            let merged = cache.save(&partial).expect("save");
            assert_eq!(merged.title.as_deref(), Some("Bank Statement"));
            assert_eq!(merged.summary.as_deref(), Some("Monthly"));
        }

        let cache = MetadataCache::open(&path).expect("reopen");
        let record = cache.get_by_hash("h1").expect("record");
        assert_eq!(record.summary.as_deref(), Some("Monthly"));
        assert_eq!(record.reporting_year, Some(2024));
        assert!(cache.get_by_src("local:/inbox:h1.pdf").is_some());
    }

    #[test]
    fn mark_copied_keeps_classifier_fields() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut cache = MetadataCache::open(&tmp.path().join("metadata.json")).expect("open");
        cache.save(&analysed("h1")).expect("save");
        cache
            .mark_copied("h1", "local:/d:Financial/Banking/a.pdf", "d/Financial/Banking/a.pdf")
            .expect("mark");

        let record = cache.get_by_hash("h1").expect("record");
        assert!(record.copied);
        assert_eq!(record.title.as_deref(), Some("Bank Statement"));
        assert_eq!(
            cache
                .get_by_dst("local:/d:Financial/Banking/a.pdf")
                .map(|r| r.sha256.as_str()),
            Some("h1")
        );

        cache
            .mark_copied("h1", "local:/d:Financial/Other/a.pdf", "d/Financial/Other/a.pdf")
            .expect("move");
        assert!(cache.get_by_dst("local:/d:Financial/Banking/a.pdf").is_none());
    }

    #[test]
    fn mark_copied_inserts_unknown_hash() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut cache = MetadataCache::open(&tmp.path().join("metadata.json")).expect("open");
        cache.mark_copied("h9", "local:/d:x.pdf", "d/x.pdf").expect("mark");
        let record = cache.get_by_hash("h9").expect("record");
        assert!(record.copied);
        assert_eq!(record.dst_path(), Some("x.pdf"));
    }

    #[test]
    fn delete_removes_record_and_indexes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut cache = MetadataCache::open(&tmp.path().join("metadata.json")).expect("open");
        cache.save(&analysed("h1")).expect("save");
        assert!(cache.delete("h1").expect("delete"));
        assert!(!cache.delete("h1").expect("delete again"));
        assert_eq!(cache.len(), 0);
        assert!(cache.get_by_src("local:/inbox:h1.pdf").is_none());
    }

    #[test]
    fn second_open_fails_while_locked() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("metadata.json");
        let _first = MetadataCache::open(&path).expect("open");
        let err = MetadataCache::open(&path).expect_err("must be locked");
        assert!(err.to_string().contains("in use"));
    }

    #[test]
    fn empty_hash_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut cache = MetadataCache::open(&tmp.path().join("metadata.json")).expect("open");
        assert!(cache.save(&FileMetadata::default()).is_err());
        assert_eq!(cache.len(), 0);
    }
}
