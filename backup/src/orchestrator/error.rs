//! # Error
//!
//! Module dedicated to backup orchestration errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::{record, transport};

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to backup orchestration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot extract file name from {0}")]
    InvalidFileNameError(PathBuf),
    #[error("cannot back up {1}")]
    BackupFileError(#[source] transport::Error, PathBuf),

    #[error(transparent)]
    RecordError(#[from] record::Error),
}
