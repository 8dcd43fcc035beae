//! # Error
//!
//! Module dedicated to drive errors. It contains an [`Error`] enum
//! based on [`thiserror::Error`] and a type alias [`Result`].

use std::{io, path::PathBuf};

use thiserror::Error;

/// The global `Result` alias of the library.
pub type Result<T> = std::result::Result<T, Error>;

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot call the drive: no usable access token, re-authentication required")]
    Unauthenticated,
    #[error("error while sending request to {1}")]
    SendRequestError(#[source] ureq::Error, String),
    #[error("cannot parse response body from {1}")]
    ParseResponseError(#[source] serde_json::Error, String),
    #[error("cannot open local file {1}")]
    OpenFileError(#[source] io::Error, PathBuf),
    #[error("cannot read local file {1}")]
    ReadFileError(#[source] io::Error, PathBuf),
    #[error("cannot read bytes {1}-{2} of local file {3}")]
    ReadChunkError(#[source] io::Error, u64, u64, PathBuf),
    #[error("chunk upload retry budget exhausted for bytes {1}-{2} of {3}")]
    ChunkUploadExhaustedError(#[source] Box<Error>, u64, u64, String),
    #[error("upload session for {0} ended without a drive item")]
    IncompleteUploadSessionError(String),

    #[error(transparent)]
    OAuthError(#[from] oauth::Error),
    #[cfg(feature = "tokio")]
    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
}
