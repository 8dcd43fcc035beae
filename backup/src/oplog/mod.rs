//! Module dedicated to the synchronization operation log.
//!
//! Every orchestrated operation opens a log entry when it starts and
//! writes its terminal state exactly once. The log is a pure audit
//! trail: the engines never read it back.

pub mod error;

use std::{fmt, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[doc(inline)]
pub use self::error::{Error, Result};

/// The type of an orchestrated operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationType {
    InitialBackup,
    IncrementalSync,
    ForceSync,
    Purge,
    SizeCheck,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialBackup => write!(f, "initial-backup"),
            Self::IncrementalSync => write!(f, "incremental-sync"),
            Self::ForceSync => write!(f, "force-sync"),
            Self::Purge => write!(f, "purge"),
            Self::SizeCheck => write!(f, "size-check"),
        }
    }
}

/// The status of an operation log entry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationStatus {
    /// The operation is still running.
    Processing,

    /// The operation finished without any per-file failure.
    Completed,

    /// The operation finished but some files failed.
    CompletedWithErrors,

    /// The operation could not run at all.
    Failed,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed-with-errors"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Handle of an open operation log entry, returned by
/// [`OperationLog::start`] and consumed by [`OperationLog::finish`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LogHandle(pub u64);

impl fmt::Display for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The operation log sink.
#[async_trait]
pub trait OperationLog: Send + Sync {
    /// Opens a new entry in the `Processing` state.
    async fn start(&self, kind: OperationType, detail: String) -> Result<LogHandle>;

    /// Writes the terminal state of the entry. Finishing an entry
    /// twice is an error: terminal states are recorded exactly once.
    async fn finish(&self, handle: LogHandle, status: OperationStatus, detail: String)
        -> Result<()>;
}

/// One entry of the in-memory operation log.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub id: u64,
    pub kind: OperationType,
    pub status: OperationStatus,
    pub detail: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// In-memory [`OperationLog`] implementation.
#[derive(Debug, Default)]
pub struct MemoryOperationLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryOperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all entries.
    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        let entries = lock(&self.entries)?;
        Ok(entries.clone())
    }
}

#[async_trait]
impl OperationLog for MemoryOperationLog {
    async fn start(&self, kind: OperationType, detail: String) -> Result<LogHandle> {
        let mut entries = lock(&self.entries)?;
        let id = entries.len() as u64;

        entries.push(LogEntry {
            id,
            kind,
            status: OperationStatus::Processing,
            detail,
            started_at: Utc::now(),
            finished_at: None,
        });

        Ok(LogHandle(id))
    }

    async fn finish(
        &self,
        handle: LogHandle,
        status: OperationStatus,
        detail: String,
    ) -> Result<()> {
        let mut entries = lock(&self.entries)?;
        let entry = entries
            .get_mut(handle.0 as usize)
            .ok_or(Error::UnknownHandleError(handle.0))?;

        if entry.status != OperationStatus::Processing {
            return Err(Error::AlreadyFinishedError(handle.0));
        }

        entry.status = status;
        entry.detail = detail;
        entry.finished_at = Some(Utc::now());

        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex.lock().map_err(|err| Error::StorageError(err.to_string()))
}
