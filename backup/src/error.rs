//! # Error
//!
//! Module dedicated to backup errors. It contains the global
//! [`Error`] enum of the library, aggregating module errors with
//! transparent variants, and a type alias [`Result`].

use thiserror::Error;

/// The global `Result` alias of the library.
pub type Result<T> = std::result::Result<T, Error>;

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    AlertError(#[from] crate::alert::Error),
    #[error(transparent)]
    FileError(#[from] crate::file::Error),
    #[error(transparent)]
    LockError(#[from] crate::lock::Error),
    #[error(transparent)]
    NotifyError(#[from] crate::notify::Error),
    #[error(transparent)]
    OperationLogError(#[from] crate::oplog::Error),
    #[error(transparent)]
    OrchestratorError(#[from] crate::orchestrator::Error),
    #[error(transparent)]
    PurgeError(#[from] crate::purge::Error),
    #[error(transparent)]
    RecordError(#[from] crate::record::Error),
    #[error(transparent)]
    TransportError(#[from] crate::transport::Error),

    #[error(transparent)]
    GraphError(#[from] graph::Error),
    #[error(transparent)]
    OAuthError(#[from] oauth::Error),
}
