//! # Error
//!
//! Module dedicated to purge errors.

use thiserror::Error;

use crate::{file, record};

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to purge.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ListCandidatesError(#[from] file::Error),
    #[error(transparent)]
    RecordError(#[from] record::Error),
}
