//! # Error
//!
//! Module dedicated to mailbox alert errors.

use thiserror::Error;

use super::AlertStatus;

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to mailbox alerts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find alert {0}")]
    AlertNotFoundError(u64),
    #[error("cannot transition alert from {0} to {1}")]
    InvalidTransitionError(AlertStatus, AlertStatus),
    #[error("alert store failure: {0}")]
    StorageError(String),
}
