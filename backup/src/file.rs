//! Module dedicated to file enumeration.
//!
//! The mail server's filesystem is consumed as a capability that
//! lists files with their path, size and modification time. The
//! [`LocalFileEnumerator`] walks a plain local directory; other
//! implementations (IMAP walker, remote agent) live outside this
//! library.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to file enumeration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot list files under {1}")]
    ListFilesError(#[source] io::Error, PathBuf),
    #[error("cannot read metadata of {1}")]
    ReadMetadataError(#[source] io::Error, PathBuf),
    #[error("cannot delete local file {1}")]
    DeleteFileError(#[source] io::Error, PathBuf),
    #[error("file enumerator failure: {0}")]
    EnumeratorError(String),
}

/// A file of the mail server's filesystem, as seen by the
/// enumerator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileDescriptor {
    /// Absolute path of the file.
    pub path: PathBuf,

    /// Size of the file content, in bytes.
    pub size: u64,

    /// Last modification time of the file.
    pub modified_at: DateTime<Utc>,
}

/// The file enumeration capability.
#[async_trait]
pub trait FileEnumerator: Send + Sync {
    /// Lists the files under the given root, optionally keeping only
    /// the ones modified after the given instant.
    async fn list(&self, root: &Path, since: Option<DateTime<Utc>>) -> Result<Vec<FileDescriptor>>;

    /// Lists the files under the given root whose modification time
    /// is older than the given cutoff.
    async fn older_than(&self, root: &Path, cutoff: DateTime<Utc>) -> Result<Vec<FileDescriptor>>;

    /// Deletes the given local file. Deleting a missing file counts
    /// as success.
    async fn delete(&self, path: &Path) -> Result<bool>;
}

/// [`FileEnumerator`] implementation walking a local directory
/// recursively.
#[derive(Clone, Debug, Default)]
pub struct LocalFileEnumerator;

impl LocalFileEnumerator {
    pub fn new() -> Self {
        Self
    }

    fn walk(root: &Path, files: &mut Vec<FileDescriptor>) -> Result<()> {
        let entries =
            std::fs::read_dir(root).map_err(|err| Error::ListFilesError(err, root.to_owned()))?;

        for entry in entries {
            let entry = entry.map_err(|err| Error::ListFilesError(err, root.to_owned()))?;
            let path = entry.path();

            if path.is_dir() {
                Self::walk(&path, files)?;
                continue;
            }

            let metadata = entry
                .metadata()
                .map_err(|err| Error::ReadMetadataError(err, path.clone()))?;
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .map_err(|err| Error::ReadMetadataError(err, path.clone()))?;

            files.push(FileDescriptor {
                path,
                size: metadata.len(),
                modified_at,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl FileEnumerator for LocalFileEnumerator {
    async fn list(&self, root: &Path, since: Option<DateTime<Utc>>) -> Result<Vec<FileDescriptor>> {
        let mut files = Vec::new();
        Self::walk(root, &mut files)?;

        if let Some(since) = since {
            files.retain(|file| file.modified_at > since);
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(files)
    }

    async fn older_than(
        &self,
        root: &Path,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FileDescriptor>> {
        let mut files = Vec::new();
        Self::walk(root, &mut files)?;

        files.retain(|file| file.modified_at < cutoff);
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(files)
    }

    async fn delete(&self, path: &Path) -> Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(err) => Err(Error::DeleteFileError(err, path.to_owned())),
        }
    }
}
