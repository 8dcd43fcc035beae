//! Module dedicated to force-sync reporting.

use std::fmt;

use crate::oplog::OperationStatus;

/// Aggregate counts of one force-sync batch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ForceSyncReport {
    /// Number of files examined.
    pub processed: usize,

    /// Number of files whose missing or corrupt backup was
    /// re-uploaded.
    pub repaired: usize,

    /// Number of files re-uploaded because the local copy changed.
    pub updated: usize,

    /// Number of files whose backup was confirmed in agreement.
    pub verified: usize,

    /// Number of files that could not be reconciled.
    pub failed: usize,
}

impl ForceSyncReport {
    pub fn status(&self) -> OperationStatus {
        if self.failed == 0 {
            OperationStatus::Completed
        } else {
            OperationStatus::CompletedWithErrors
        }
    }
}

impl fmt::Display for ForceSyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} files ({} repaired, {} updated, {} verified, {} failed)",
            self.processed, self.repaired, self.updated, self.verified, self.failed
        )
    }
}
