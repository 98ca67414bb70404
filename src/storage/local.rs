use super::{DownloadedFile, FileInfo, FolderInfo, StorageDriver, StorageError};
use crate::papersort::retry::RetryPolicy;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Filesystem backend. All paths are relative to `root`.
#[derive(Debug, Clone)]
pub struct LocalDriver {
    root: PathBuf,
    read_only: bool,
    retry: RetryPolicy,
}

impl LocalDriver {
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        let root = std::path::absolute(root)
            .map_err(|err| StorageError::from_io(root.display().to_string(), err))?;
        if !root.exists() {
            return Err(StorageError::NotFound(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root,
            read_only: false,
            retry: RetryPolicy::default(),
        })
    }

    pub fn open_read_only(root: &Path) -> Result<Self, StorageError> {
        let mut driver = Self::open(root)?;
        driver.read_only = true;
        Ok(driver)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => full.push(part),
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        Ok(full)
    }

    fn relative(&self, abs: &Path) -> String {
        abs.strip_prefix(&self.root)
            .unwrap_or(abs)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn with_retry_on<T>(
        &self,
        op: impl FnMut() -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.retry.run(StorageError::is_transient, op)
    }

    fn ensure_writable(&self, op: &'static str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly(op));
        }
        Ok(())
    }

    fn require_dir(&self, path: &str, full: &Path) -> Result<(), StorageError> {
        if !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        if !full.is_dir() {
            return Err(StorageError::InvalidPath(format!("not a directory: {path}")));
        }
        Ok(())
    }

    fn file_info(&self, abs: &Path) -> FileInfo {
        FileInfo {
            path: self.relative(abs),
            name: abs
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: fs::metadata(abs).ok().map(|m| m.len()),
        }
    }
}

fn has_extension(name: &str, extension: Option<&str>) -> bool {
    match extension {
        Some(ext) => name.to_ascii_lowercase().ends_with(&ext.to_ascii_lowercase()),
        None => true,
    }
}

fn move_on_disk(from: &Path, to: &Path) -> std::io::Result<()> {
    if from == to {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(err) => Err(err),
    }
}

impl StorageDriver for LocalDriver {
    fn scheme(&self) -> &'static str {
        "local"
    }

    fn root_id(&self) -> String {
        self.root.display().to_string()
    }

    fn display_name(&self) -> String {
        format!("{} (local)", self.root.display())
    }

    fn list_files(
        &self,
        path: &str,
        recursive: bool,
        extension: Option<&str>,
    ) -> Result<Vec<FileInfo>, StorageError> {
        let full = self.full_path(path)?;
        self.require_dir(path, &full)?;

        self.with_retry_on(|| {
            let mut out = Vec::new();
            if recursive {
                for entry in WalkDir::new(&full).sort_by_file_name() {
                    let entry = entry.map_err(|err| {
                        let io = err
                            .into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                        StorageError::from_io(path, io)
                    })?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy();
                    if has_extension(&name, extension) {
                        out.push(self.file_info(entry.path()));
                    }
                }
            } else {
                let entries = fs::read_dir(&full).map_err(|err| StorageError::from_io(path, err))?;
                for entry in entries {
                    let entry = entry.map_err(|err| StorageError::from_io(path, err))?;
                    let abs = entry.path();
                    if !abs.is_file() {
                        continue;
                    }
                    if has_extension(&entry.file_name().to_string_lossy(), extension) {
                        out.push(self.file_info(&abs));
                    }
                }
                out.sort_by(|a, b| a.name.cmp(&b.name));
            }
            Ok(out)
        })
    }

    fn list_folders(&self, path: &str) -> Result<Vec<FolderInfo>, StorageError> {
        let full = self.full_path(path)?;
        self.require_dir(path, &full)?;

        self.with_retry_on(|| {
            let mut out = Vec::new();
            let entries = fs::read_dir(&full).map_err(|err| StorageError::from_io(path, err))?;
            for entry in entries {
                let entry = entry.map_err(|err| StorageError::from_io(path, err))?;
                let abs = entry.path();
                if abs.is_dir() {
                    out.push(FolderInfo {
                        path: self.relative(&abs),
                        name: entry.file_name().to_string_lossy().into_owned(),
                    });
                }
            }
            out.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(out)
        })
    }

    fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.full_path(path)?.is_file())
    }

    fn read_text(&self, path: &str) -> Result<String, StorageError> {
        let full = self.full_path(path)?;
        self.with_retry_on(|| fs::read_to_string(&full).map_err(|err| StorageError::from_io(path, err)))
    }

    fn download_to_local(&self, path: &str) -> Result<DownloadedFile, StorageError> {
        let full = self.full_path(path)?;
        if !full.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(DownloadedFile::InPlace(full))
    }

    fn upload(&self, local_path: &Path, dest_path: &str) -> Result<(), StorageError> {
        self.ensure_writable("upload")?;
        let full = self.full_path(dest_path)?;
        self.with_retry_on(|| {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).map_err(|err| StorageError::from_io(dest_path, err))?;
            }
            fs::copy(local_path, &full)
                .map(|_| ())
                .map_err(|err| StorageError::from_io(dest_path, err))
        })
    }

    fn move_file(&self, src_path: &str, dest_folder: &str) -> Result<(), StorageError> {
        self.ensure_writable("move")?;
        let from = self.full_path(src_path)?;
        if !from.exists() {
            return Err(StorageError::NotFound(src_path.to_string()));
        }
        let name = super::file_name(src_path);
        let dest_path = super::join_path(dest_folder, name);
        let to = self.full_path(&dest_path)?;
        if to != from && to.exists() {
            return Err(StorageError::AlreadyExists(dest_path));
        }
        self.with_retry_on(|| {
            move_on_disk(&from, &to).map_err(|err| StorageError::from_io(src_path, err))
        })
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.ensure_writable("delete")?;
        let full = self.full_path(path)?;
        if full == self.root {
            return Err(StorageError::InvalidPath("refusing to delete the storage root".into()));
        }
        if !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        self.with_retry_on(|| {
            let result = if full.is_dir() {
                fs::remove_dir_all(&full)
            } else {
                fs::remove_file(&full)
            };
            result.map_err(|err| StorageError::from_io(path, err))
        })
    }
}
