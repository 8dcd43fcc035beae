//! # Error
//!
//! Module dedicated to backup record errors.

use std::path::PathBuf;

use thiserror::Error;

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to the backup record store.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find backup record for {0}")]
    RecordNotFoundError(PathBuf),
    #[error("backup record store failure: {0}")]
    StorageError(String),
}
