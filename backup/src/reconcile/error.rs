//! # Error
//!
//! Module dedicated to reconciliation errors.

use thiserror::Error;

use crate::{orchestrator, record};

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to reconciliation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    OrchestratorError(#[from] orchestrator::Error),
    #[error(transparent)]
    RecordError(#[from] record::Error),
}
