//! Module dedicated to purge reporting.

use std::fmt;

use crate::oplog::OperationStatus;

/// Aggregate counts of one purge run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PurgeReport {
    /// Number of candidate files examined.
    pub examined: usize,

    /// Number of files purged (or that would be, in dry-run mode).
    pub purged: usize,

    /// Number of candidates skipped as unsafe to purge.
    pub failed: usize,

    /// Local bytes reclaimed (or that would be, in dry-run mode).
    pub reclaimed_bytes: u64,

    /// Whether the run was a simulation.
    pub dry_run: bool,
}

impl PurgeReport {
    pub fn status(&self) -> OperationStatus {
        if self.failed == 0 {
            OperationStatus::Completed
        } else {
            OperationStatus::CompletedWithErrors
        }
    }
}

impl fmt::Display for PurgeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "examined {} files ({} purged, {} failed, {} bytes reclaimed{})",
            self.examined,
            self.purged,
            self.failed,
            self.reclaimed_bytes,
            if self.dry_run { ", dry run" } else { "" },
        )
    }
}
