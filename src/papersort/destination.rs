//! Decides where a document lands in the docstore and puts it there.
//!
//! For one content hash, repeated calls converge on a single physical file.
//! Two different documents that want the same name never overwrite each
//! other: the later one gets a hash-suffixed name.

use crate::classifier::Classifier;
use crate::papersort::cache::MetadataCache;
use crate::papersort::folder_match::resolve_company_folder;
use crate::papersort::layout::Layout;
use crate::storage::{StorageDriver, file_name, join_path};
use anyhow::{Context, Result};
use std::path::Path;

const PLACEHOLDER_NAME: &str = "Document";
const EXTENSION: &str = ".pdf";
const HASH_PREFIX_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationCandidate {
    pub folder: String,
    pub base_name: String,
    pub hashed_name: String,
}

impl DestinationCandidate {
    pub fn new(
        driver: &dyn StorageDriver,
        folder: &str,
        title: &str,
        year: Option<i32>,
        sha256: &str,
    ) -> Self {
        let raw = match year {
            Some(year) => format!("{title} {year}"),
            None => title.to_string(),
        };
        let mut stem = driver.sanitize_filename(&raw);
        if stem.is_empty() {
            stem = PLACEHOLDER_NAME.to_string();
        }
        let short_hash = sha256.get(..HASH_PREFIX_CHARS).unwrap_or(sha256);
        Self {
            folder: folder.trim_matches('/').to_string(),
            base_name: format!("{stem}{EXTENSION}"),
            hashed_name: format!("{stem} [{short_hash}]{EXTENSION}"),
        }
    }

    pub fn base_path(&self) -> String {
        join_path(&self.folder, &self.base_name)
    }

    pub fn hashed_path(&self) -> String {
        join_path(&self.folder, &self.hashed_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Cache says the file is already in the right folder; nothing checked.
    AlreadyFiled(String),
    /// Verify mode found the file where the cache says it is.
    Verified(String),
    /// Verify mode found the file missing and uploaded it again.
    Recopied(String),
    Moved { from: String, to: String },
    Copied(String),
    /// The hash-suffixed name already holds this document.
    AlreadyPresent(String),
}

impl ResolveOutcome {
    pub fn path(&self) -> &str {
        match self {
            Self::AlreadyFiled(path)
            | Self::Verified(path)
            | Self::Recopied(path)
            | Self::Copied(path)
            | Self::AlreadyPresent(path) => path,
            Self::Moved { to, .. } => to,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::AlreadyFiled(path) => format!("already in correct location: {path}"),
            Self::Verified(path) => format!("verified: {path}"),
            Self::Recopied(path) => format!("missing, re-copied to: {path}"),
            Self::Moved { from, to } => format!("moved: {from} -> {to}"),
            Self::Copied(path) => format!("copied to: {path}"),
            Self::AlreadyPresent(path) => format!("already exists: {path}"),
        }
    }
}

/// What is being placed. `local_path` is the bytes to upload if needed.
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    pub sha256: &'a str,
    pub local_path: &'a Path,
    pub title: &'a str,
    pub year: Option<i32>,
    pub suggested_path: &'a str,
    pub verify: bool,
}

fn exists(driver: &dyn StorageDriver, path: &str) -> Result<bool> {
    driver
        .file_exists(path)
        .with_context(|| format!("failed to check {path}"))
}

fn upload(driver: &dyn StorageDriver, local: &Path, dest: &str) -> Result<()> {
    driver
        .upload(local, dest)
        .with_context(|| format!("failed to upload {} to {dest}", local.display()))
}

fn mark(
    cache: &mut MetadataCache,
    driver: &dyn StorageDriver,
    sha256: &str,
    path: &str,
) -> Result<()> {
    cache.mark_copied(sha256, &driver.locator(path), &driver.display_path(path))
}

pub fn resolve(
    driver: &dyn StorageDriver,
    cache: &mut MetadataCache,
    layout: &Layout,
    classifier: &dyn Classifier,
    placement: &Placement<'_>,
) -> Result<ResolveOutcome> {
    let folder = resolve_company_folder(layout, driver, classifier, placement.suggested_path);
    let candidate = DestinationCandidate::new(
        driver,
        &folder,
        placement.title,
        placement.year,
        placement.sha256,
    );

    let previous = cache
        .get_by_hash(placement.sha256)
        .filter(|record| record.copied)
        .and_then(|record| record.dst_path().map(str::to_string));

    if let Some(current) = previous {
        return relocate(driver, cache, placement, &candidate, &current);
    }
    place_new(driver, cache, placement, &candidate)
}

fn relocate(
    driver: &dyn StorageDriver,
    cache: &mut MetadataCache,
    placement: &Placement<'_>,
    candidate: &DestinationCandidate,
    current: &str,
) -> Result<ResolveOutcome> {
    let current_folder = crate::storage::parent_folder(current);
    if current_folder == candidate.folder {
        if !placement.verify {
            return Ok(ResolveOutcome::AlreadyFiled(current.to_string()));
        }
        if exists(driver, current)? {
            return Ok(ResolveOutcome::Verified(current.to_string()));
        }
        tracing::warn!("file missing at {current}, re-copying");
        upload(driver, placement.local_path, current)?;
        mark(cache, driver, placement.sha256, current)?;
        return Ok(ResolveOutcome::Recopied(current.to_string()));
    }

    tracing::info!("path changed: {current_folder} -> {}", candidate.folder);
    let target = join_path(&candidate.folder, file_name(current));

    if !exists(driver, current)? {
        tracing::warn!("file missing at old location {current}, copying to new location");
        if exists(driver, &target)? {
            return place_new(driver, cache, placement, candidate);
        }
        upload(driver, placement.local_path, &target)?;
        mark(cache, driver, placement.sha256, &target)?;
        return Ok(ResolveOutcome::Copied(target));
    }

    if exists(driver, &target)? {
        // Another document holds the name in the new folder, so the file
        // lands under its hashed name and the old copy is removed.
        let hashed = candidate.hashed_path();
        if !exists(driver, &hashed)? {
            upload(driver, placement.local_path, &hashed)?;
        }
        mark(cache, driver, placement.sha256, &hashed)?;
        if let Err(err) = driver.delete(current) {
            tracing::warn!("filed {hashed} but could not remove old copy {current}: {err}");
        }
        return Ok(ResolveOutcome::Moved {
            from: current.to_string(),
            to: hashed,
        });
    }

    driver
        .move_file(current, &candidate.folder)
        .with_context(|| format!("failed to move {current} to {}", candidate.folder))?;
    mark(cache, driver, placement.sha256, &target)?;
    Ok(ResolveOutcome::Moved {
        from: current.to_string(),
        to: target,
    })
}

fn place_new(
    driver: &dyn StorageDriver,
    cache: &mut MetadataCache,
    placement: &Placement<'_>,
    candidate: &DestinationCandidate,
) -> Result<ResolveOutcome> {
    let base = candidate.base_path();
    if !exists(driver, &base)? {
        upload(driver, placement.local_path, &base)?;
        mark(cache, driver, placement.sha256, &base)?;
        return Ok(ResolveOutcome::Copied(base));
    }
    let holder = cache
        .get_by_dst(&driver.locator(&base))
        .map(|record| record.sha256 == placement.sha256);
    if holder == Some(true) {
        mark(cache, driver, placement.sha256, &base)?;
        return Ok(ResolveOutcome::AlreadyPresent(base));
    }

    let hashed = candidate.hashed_path();
    if exists(driver, &hashed)? {
        mark(cache, driver, placement.sha256, &hashed)?;
        return Ok(ResolveOutcome::AlreadyPresent(hashed));
    }
    upload(driver, placement.local_path, &hashed)?;
    mark(cache, driver, placement.sha256, &hashed)?;
    Ok(ResolveOutcome::Copied(hashed))
}
