//! Module dedicated to size check reporting.

use std::fmt;

use crate::oplog::OperationStatus;

/// Aggregate counts of one size check run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SizeCheckReport {
    /// Number of mailboxes checked.
    pub checked: usize,

    /// Number of mailboxes over one of their alert bands.
    pub breached: usize,

    /// Number of alerts auto-resolved because the size dropped back.
    pub resolved: usize,

    /// Number of mailboxes that could not be checked.
    pub failed: usize,
}

impl SizeCheckReport {
    pub fn status(&self) -> OperationStatus {
        if self.failed == 0 {
            OperationStatus::Completed
        } else {
            OperationStatus::CompletedWithErrors
        }
    }
}

impl fmt::Display for SizeCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked {} mailboxes ({} breached, {} resolved, {} failed)",
            self.checked, self.breached, self.resolved, self.failed
        )
    }
}
