pub mod local;

use crate::papersort::retry::RetryPolicy;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use local::LocalDriver;

pub const MAX_SANITIZED_FILENAME_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path does not exist: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("destination already exists: {0}")]
    AlreadyExists(String),
    #[error("transient storage failure: {0}")]
    Transient(String),
    #[error("storage backend is read-only; {0} is not supported")]
    ReadOnly(&'static str),
    #[error("unsupported storage backend: {0}")]
    Unsupported(String),
    #[error("storage i/o failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(path),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::ResourceBusy => Self::Transient(format!("{path}: {err}")),
            _ => Self::Io { path, source: err },
        }
    }

    /// Retry predicate for filesystem-backed drivers.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path relative to the driver root, `/`-separated.
    pub path: String,
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub path: String,
    pub name: String,
}

/// A document made available on local disk for hashing and classification.
/// Local backends hand out the original path, which must not be removed.
#[derive(Debug)]
pub enum DownloadedFile {
    InPlace(PathBuf),
}

impl DownloadedFile {
    pub fn path(&self) -> &Path {
        match self {
            Self::InPlace(path) => path,
        }
    }
}

/// Capability surface every docstore or inbox backend offers. Paths are
/// relative to the backend root and use `/` separators.
pub trait StorageDriver {
    fn scheme(&self) -> &'static str;

    /// Backend-specific root identifier embedded in locators.
    fn root_id(&self) -> String;

    fn display_name(&self) -> String;

    fn list_files(
        &self,
        path: &str,
        recursive: bool,
        extension: Option<&str>,
    ) -> Result<Vec<FileInfo>, StorageError>;

    fn list_folders(&self, path: &str) -> Result<Vec<FolderInfo>, StorageError>;

    fn file_exists(&self, path: &str) -> Result<bool, StorageError>;

    fn read_text(&self, path: &str) -> Result<String, StorageError>;

    fn download_to_local(&self, path: &str) -> Result<DownloadedFile, StorageError>;

    fn upload(&self, _local_path: &Path, _dest_path: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly("upload"))
    }

    /// Moves `src_path` into `dest_folder`, keeping its file name.
    fn move_file(&self, _src_path: &str, _dest_folder: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly("move"))
    }

    fn delete(&self, _path: &str) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly("delete"))
    }

    fn sanitize_filename(&self, name: &str) -> String {
        sanitize_filename(name)
    }

    fn locator(&self, path: &str) -> String {
        format!("{}:{}:{}", self.scheme(), self.root_id(), path)
    }

    fn display_path(&self, path: &str) -> String {
        format!("{}/{}", self.display_name(), path)
    }
}

/// Builds a driver from a `scheme:location` URI.
pub fn create_storage(uri: &str, retry: RetryPolicy) -> Result<Box<dyn StorageDriver>, StorageError> {
    let trimmed = uri.trim();
    let (scheme, location) = trimmed
        .split_once(':')
        .ok_or_else(|| StorageError::InvalidPath(format!("missing scheme in '{trimmed}'")))?;
    match scheme.to_ascii_lowercase().as_str() {
        "local" => Ok(Box::new(
            LocalDriver::open(Path::new(location))?.with_retry(retry),
        )),
        "gdrive" | "dropbox" => Err(StorageError::Unsupported(format!(
            "{scheme} (only local: is available in this build)"
        ))),
        other => Err(StorageError::Unsupported(other.to_string())),
    }
}

/// Same as [`create_storage`], but writes are refused.
pub fn create_read_only_storage(
    uri: &str,
    retry: RetryPolicy,
) -> Result<Box<dyn StorageDriver>, StorageError> {
    let trimmed = uri.trim();
    match trimmed.split_once(':') {
        Some((scheme, location)) if scheme.eq_ignore_ascii_case("local") => Ok(Box::new(
            LocalDriver::open_read_only(Path::new(location))?.with_retry(retry),
        )),
        _ => create_storage(trimmed, retry),
    }
}

/// Path portion of a `scheme:root:path` locator.
pub fn locator_path(locator: &str) -> Option<&str> {
    let mut parts = locator.splitn(3, ':');
    let _scheme = parts.next()?;
    let _root = parts.next()?;
    parts.next()
}

pub fn parent_folder(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(folder, _)| folder)
}

pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Makes `name` safe as a single path component on common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    let mut replaced = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '|' => replaced.push('-'),
            '*' | '?' | '<' | '>' => {}
            '"' => replaced.push('\''),
            other => replaced.push(other),
        }
    }

    let trimmed = replaced.trim().trim_matches('.');
    let mut out = String::with_capacity(trimmed.len());
    let mut prev: Option<char> = None;
    for ch in trimmed.chars() {
        let ch = if ch.is_whitespace() { ' ' } else { ch };
        if (ch == ' ' || ch == '-') && prev == Some(ch) {
            continue;
        }
        out.push(ch);
        prev = Some(ch);
    }

    if out.chars().count() > MAX_SANITIZED_FILENAME_CHARS {
        out = out
            .chars()
            .take(MAX_SANITIZED_FILENAME_CHARS)
            .collect::<String>()
            .trim()
            .to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_replaces_and_collapses() {
        assert_eq!(sanitize_filename("a/b\\c:d|e"), "a-b-c-d-e");
        assert_eq!(sanitize_filename("what?*<now>"), "whatnow");
        assert_eq!(sanitize_filename("say \"hi\""), "say 'hi'");
        assert_eq!(sanitize_filename("  ..Report   2024..  "), "Report 2024");
        assert_eq!(sanitize_filename("a//b"), "a-b");
        assert_eq!(sanitize_filename("?*"), "");
    }

    #[test]
    fn sanitize_filename_truncates_long_names() {
        let long = "x".repeat(150);
        assert_eq!(sanitize_filename(&long).chars().count(), 100);
    }

    #[test]
    fn locator_helpers_split_path_parts() {
        let locator = "local:/srv/docs:Financial/Banking/Statement.pdf";
        assert_eq!(locator_path(locator), Some("Financial/Banking/Statement.pdf"));
        assert_eq!(parent_folder("Financial/Banking/Statement.pdf"), "Financial/Banking");
        assert_eq!(parent_folder("Statement.pdf"), "");
        assert_eq!(file_name("Financial/Banking/Statement.pdf"), "Statement.pdf");
        assert_eq!(join_path("", "a.pdf"), "a.pdf");
        assert_eq!(join_path("Taxes/", "a.pdf"), "Taxes/a.pdf");
        assert_eq!(locator_path("nonsense"), None);
    }

    #[test]
    fn create_storage_rejects_cloud_and_unknown_schemes() {
        assert!(matches!(
            create_storage("gdrive:abc123", RetryPolicy::default()),
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            create_storage("s3:bucket", RetryPolicy::default()),
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            create_storage("no-scheme", RetryPolicy::default()),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn io_errors_map_to_permanent_or_transient() {
        let nf = StorageError::from_io("x", std::io::Error::from(ErrorKind::NotFound));
        assert!(matches!(nf, StorageError::NotFound(_)));
        assert!(!nf.is_transient());
        let busy = StorageError::from_io("x", std::io::Error::from(ErrorKind::TimedOut));
        assert!(busy.is_transient());
    }
}
