//! Module dedicated to backup records.
//!
//! A [`BackupRecord`] is the durable mapping from a source file path
//! to its cloud counterpart. Records are created on first backup
//! attempt, mutated by reconciliation and purge, and never deleted:
//! history is preserved by re-stating them.

pub mod error;

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[doc(inline)]
pub use self::error::{Error, Result};

/// The status of a backup record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum BackupStatus {
    /// The record exists but no upload was attempted yet.
    Pending,

    /// An upload is in flight.
    Processing,

    /// The cloud object was uploaded and confirmed.
    Completed,

    /// The last upload attempt failed; see the record error message.
    Failed,

    /// The local file was deleted after its cloud backup was
    /// verified.
    Purged,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Purged => write!(f, "purged"),
        }
    }
}

/// The backup record of one source file, keyed by its local path.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct BackupRecord {
    /// Local path of the source file, the unique key of the record.
    pub local_path: PathBuf,

    /// Path of the cloud object backing the file up.
    pub cloud_path: String,

    /// Current status of the record.
    pub status: BackupStatus,

    /// Size of the file content at last upload, in bytes.
    pub size: u64,

    /// Content checksum, when one was computed or retrieved.
    pub checksum: Option<String>,

    /// Last time the cloud object was verified reachable.
    pub last_verified_at: Option<DateTime<Utc>>,

    /// Last time the record was re-stated.
    pub updated_at: DateTime<Utc>,

    /// How many upload attempts failed for this file.
    pub retry_count: u32,

    /// Error message of the last failed attempt.
    pub error: Option<String>,
}

impl BackupRecord {
    pub fn new(local_path: impl Into<PathBuf>, cloud_path: impl ToString, size: u64) -> Self {
        Self {
            local_path: local_path.into(),
            cloud_path: cloud_path.to_string(),
            status: BackupStatus::Pending,
            size,
            checksum: None,
            last_verified_at: None,
            updated_at: Utc::now(),
            retry_count: 0,
            error: None,
        }
    }
}

/// The backup record persistence seam.
///
/// Upserts by path must be safe under concurrent writers: the path is
/// the natural contention key and last-writer-wins on status is
/// acceptable since status transitions are idempotent in intent.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_path(&self, path: &Path) -> Result<Option<BackupRecord>>;
    async fn upsert(&self, record: BackupRecord) -> Result<()>;
    async fn mark_purged(&self, path: &Path) -> Result<()>;
}

/// In-memory [`RecordStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<PathBuf, BackupRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all records, sorted by local path.
    pub fn all(&self) -> Result<Vec<BackupRecord>> {
        let records = lock(&self.records)?;
        let mut records: Vec<_> = records.values().cloned().collect();
        records.sort_by(|a, b| a.local_path.cmp(&b.local_path));
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_path(&self, path: &Path) -> Result<Option<BackupRecord>> {
        let records = lock(&self.records)?;
        Ok(records.get(path).cloned())
    }

    async fn upsert(&self, record: BackupRecord) -> Result<()> {
        let mut records = lock(&self.records)?;
        records.insert(record.local_path.clone(), record);
        Ok(())
    }

    async fn mark_purged(&self, path: &Path) -> Result<()> {
        let mut records = lock(&self.records)?;
        let record = records
            .get_mut(path)
            .ok_or_else(|| Error::RecordNotFoundError(path.to_owned()))?;

        record.status = BackupStatus::Purged;
        record.updated_at = Utc::now();

        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex.lock().map_err(|err| Error::StorageError(err.to_string()))
}
