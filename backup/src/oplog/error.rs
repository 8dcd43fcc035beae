//! # Error
//!
//! Module dedicated to operation log errors.

use thiserror::Error;

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to the operation log.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find operation log entry {0}")]
    UnknownHandleError(u64),
    #[error("operation log entry {0} already reached a terminal state")]
    AlreadyFinishedError(u64),
    #[error("operation log failure: {0}")]
    StorageError(String),
}
