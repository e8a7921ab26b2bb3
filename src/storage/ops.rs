//! Local filesystem executor for a storage node's export root.
//!
//! Namespace paths arrive with a leading `/` which is stripped before
//! touching the local tree; `..` components are refused outright so a
//! request can never escape the root.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub struct StorageBackend {
    root: PathBuf,
}

impl StorageBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// CREATE_FILE: a new empty file named `name` inside directory `dir`.
    pub fn create_file(&self, dir: &str, name: &str) -> Result<(), StorageOpError> {
        let target = self.local_path(dir)?.join(sanitize_name(name)?);
        fs::File::create(target)?;
        Ok(())
    }

    /// CREATE_DIR: a new directory named `name` inside directory `dir`.
    pub fn create_dir(&self, dir: &str, name: &str) -> Result<(), StorageOpError> {
        let target = self.local_path(dir)?.join(sanitize_name(name)?);
        fs::create_dir(target)?;
        Ok(())
    }

    pub fn delete_file(&self, path: &str) -> Result<(), StorageOpError> {
        fs::remove_file(self.local_path(path)?)?;
        Ok(())
    }

    /// DELETE_DIR removes the directory and everything under it.
    pub fn delete_dir(&self, path: &str) -> Result<(), StorageOpError> {
        fs::remove_dir_all(self.local_path(path)?)?;
        Ok(())
    }

    pub fn open_for_read(&self, path: &str) -> Result<fs::File, StorageOpError> {
        Ok(fs::File::open(self.local_path(path)?)?)
    }

    pub fn open_for_write(&self, path: &str) -> Result<fs::File, StorageOpError> {
        Ok(fs::File::create(self.local_path(path)?)?)
    }

    /// FILE_INFO: a short human-readable stat line.
    pub fn file_info(&self, path: &str) -> Result<String, StorageOpError> {
        let metadata = fs::metadata(self.local_path(path)?)?;
        let kind = if metadata.is_dir() { "directory" } else { "file" };
        Ok(format!("{path} {kind} {} bytes", metadata.len()))
    }

    /// LIST_ALL: every file and empty directory under `path`, one
    /// namespace path per line.
    pub fn list_all(&self, path: &str) -> Result<String, StorageOpError> {
        let local = self.local_path(path)?;
        let entries = super::scan_paths(&local)?;
        let prefix = path.trim_end_matches('/');
        let lines: Vec<String> = entries
            .into_iter()
            .map(|entry| format!("{prefix}{entry}"))
            .collect();
        Ok(lines.join("\n"))
    }

    fn local_path(&self, namespace_path: &str) -> Result<PathBuf, StorageOpError> {
        let relative = namespace_path.trim_start_matches('/');
        let candidate = Path::new(relative);
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(StorageOpError::InvalidPath(namespace_path.to_string()));
                }
            }
        }
        Ok(self.root.join(candidate))
    }
}

fn sanitize_name(name: &str) -> Result<&str, StorageOpError> {
    if name.is_empty() || name.contains('/') || name == ".." {
        return Err(StorageOpError::InvalidPath(name.to_string()));
    }
    Ok(name)
}

#[derive(Debug, Error)]
pub enum StorageOpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid path `{0}`")]
    InvalidPath(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> (TempDir, StorageBackend) {
        let root = TempDir::new().unwrap();
        let backend = StorageBackend::new(root.path());
        (root, backend)
    }

    #[test]
    fn create_and_delete_file() {
        let (root, backend) = backend();
        backend.create_file("/", "a.txt").unwrap();
        assert!(root.path().join("a.txt").exists());
        backend.delete_file("/a.txt").unwrap();
        assert!(!root.path().join("a.txt").exists());
    }

    #[test]
    fn create_dir_then_file_inside() {
        let (root, backend) = backend();
        backend.create_dir("/", "docs").unwrap();
        backend.create_file("/docs/", "a.txt").unwrap();
        assert!(root.path().join("docs/a.txt").exists());
    }

    #[test]
    fn delete_dir_removes_subtree() {
        let (root, backend) = backend();
        backend.create_dir("/", "docs").unwrap();
        backend.create_file("/docs/", "a.txt").unwrap();
        backend.delete_dir("/docs/").unwrap();
        assert!(!root.path().join("docs").exists());
    }

    #[test]
    fn traversal_is_refused() {
        let (_root, backend) = backend();
        assert!(matches!(
            backend.delete_file("/../etc/passwd"),
            Err(StorageOpError::InvalidPath(_))
        ));
        assert!(matches!(
            backend.create_file("/", "../evil"),
            Err(StorageOpError::InvalidPath(_))
        ));
    }

    #[test]
    fn file_info_reports_kind_and_size() {
        let (_root, backend) = backend();
        backend.create_dir("/", "docs").unwrap();
        backend.create_file("/docs/", "a.txt").unwrap();
        let info = backend.file_info("/docs/a.txt").unwrap();
        assert!(info.contains("file"));
        assert!(info.contains("0 bytes"));
        let info = backend.file_info("/docs/").unwrap();
        assert!(info.contains("directory"));
    }

    #[test]
    fn list_all_prefixes_namespace_paths() {
        let (_root, backend) = backend();
        backend.create_dir("/", "docs").unwrap();
        backend.create_file("/docs/", "a.txt").unwrap();
        let listing = backend.list_all("/docs/").unwrap();
        assert_eq!(listing, "/docs/a.txt");
    }

    #[test]
    fn missing_file_surfaces_io_error() {
        let (_root, backend) = backend();
        assert!(matches!(
            backend.file_info("/nope.txt"),
            Err(StorageOpError::Io(_))
        ));
    }
}
