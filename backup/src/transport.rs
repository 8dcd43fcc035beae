//! Module dedicated to the object store seam.
//!
//! The engines talk to the cloud store through the [`ObjectStore`]
//! trait so they can be exercised against any range-upload-capable
//! store (or a fake in tests). The Microsoft Graph [`graph::Drive`]
//! is the production implementation.

use std::path::Path;

use async_trait::async_trait;
pub use graph::{ItemMetadata, ProgressFn, RemoteItem};
use thiserror::Error;

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to the object store.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    GraphError(#[from] graph::Error),
    #[error("object store failure: {0}")]
    StoreError(String),
}

/// The cloud object store capability consumed by the engines.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads a local file to the given remote path, choosing the
    /// simple or the resumable path by payload size.
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: Option<ProgressFn>,
    ) -> Result<RemoteItem>;

    /// Streams the remote content to the given local sink. `false`
    /// means "could not download", a data condition.
    async fn download(&self, remote: &str, sink: &Path) -> Result<bool>;

    /// Checks whether an object exists at the given remote path.
    async fn exists(&self, remote: &str) -> Result<bool>;

    /// Fetches the metadata of the object at the given remote path.
    async fn metadata(&self, remote: &str) -> Result<Option<ItemMetadata>>;

    /// Returns the content checksum of the object, when the store
    /// reports one.
    async fn checksum(&self, remote: &str) -> Result<Option<String>>;

    /// Deletes the object at the given remote path. Deleting a
    /// missing object counts as success.
    async fn delete(&self, remote: &str) -> Result<bool>;
}

#[async_trait]
impl ObjectStore for graph::Drive {
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: Option<ProgressFn>,
    ) -> Result<RemoteItem> {
        Ok(graph::Drive::upload(self, local, remote, progress).await?)
    }

    async fn download(&self, remote: &str, sink: &Path) -> Result<bool> {
        Ok(graph::Drive::download(self, remote, sink).await?)
    }

    async fn exists(&self, remote: &str) -> Result<bool> {
        Ok(graph::Drive::exists(self, remote).await?)
    }

    async fn metadata(&self, remote: &str) -> Result<Option<ItemMetadata>> {
        Ok(graph::Drive::metadata(self, remote).await?)
    }

    async fn checksum(&self, remote: &str) -> Result<Option<String>> {
        Ok(graph::Drive::checksum(self, remote).await?)
    }

    async fn delete(&self, remote: &str) -> Result<bool> {
        Ok(graph::Drive::delete(self, remote).await?)
    }
}
