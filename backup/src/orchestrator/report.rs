//! Module dedicated to batch reporting.

use std::fmt;

use crate::oplog::OperationStatus;

/// Aggregate counts of one backup or sync batch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BatchReport {
    /// Number of files examined.
    pub processed: usize,

    /// Number of files backed up (or already backed up).
    pub succeeded: usize,

    /// Number of files skipped as up to date.
    pub skipped: usize,

    /// Number of files whose backup failed.
    pub failed: usize,
}

impl BatchReport {
    /// Returns the terminal operation status the batch maps to: a
    /// batch never fails as a whole on per-file errors, it completes
    /// with errors instead.
    pub fn status(&self) -> OperationStatus {
        if self.failed == 0 {
            OperationStatus::Completed
        } else {
            OperationStatus::CompletedWithErrors
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} files ({} succeeded, {} skipped, {} failed)",
            self.processed, self.succeeded, self.skipped, self.failed
        )
    }
}
