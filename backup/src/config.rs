//! Module dedicated to the backup configuration.
//!
//! The configuration is an explicit, immutable structure injected
//! into each component at construction. There is no ambient or
//! global lookup.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// The default cloud folder backups are placed under.
pub const DEFAULT_BASE_FOLDER: &str = "backups";

/// The default purge retention, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// The default mailbox size threshold, in MB.
pub const DEFAULT_SIZE_THRESHOLD_MB: u64 = 1000;

/// The default usage percentage above which a warning alert is
/// raised.
pub const DEFAULT_WARNING_PERCENT: f64 = 80.0;

/// The default usage percentage above which a critical alert is
/// raised.
pub const DEFAULT_CRITICAL_PERCENT: f64 = 95.0;

/// The default number of files processed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// The default lease duration of the per-mailbox lock (30 min).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30 * 60);

/// The backup configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct BackupConfig {
    /// Root directory the mailbox directories live under.
    pub mail_root: PathBuf,

    /// Cloud folder all backups are placed under. Cloud paths are
    /// date-partitioned below it: `base/yyyy/mm/dd/mailbox/filename`.
    pub base_folder: String,

    /// Age past which a locally backed up file becomes eligible for
    /// purge, in days.
    pub retention_days: i64,

    /// Default mailbox size threshold, in MB.
    pub size_threshold_mb: u64,

    /// Usage percentage above which a warning alert is raised.
    pub warning_percent: f64,

    /// Usage percentage above which a critical alert is raised.
    pub critical_percent: f64,

    /// Number of files processed per batch.
    pub batch_size: usize,

    /// Lease duration of the per-mailbox advisory lock.
    pub lock_ttl: Duration,
}

impl BackupConfig {
    /// Returns the local root directory of the given mailbox.
    pub fn mailbox_root(&self, mailbox: &str) -> PathBuf {
        self.mail_root.join(mailbox)
    }

    /// Returns the configured mailbox size threshold, in bytes.
    pub fn size_threshold_bytes(&self) -> u64 {
        self.size_threshold_mb * 1024 * 1024
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            mail_root: Path::new(".").to_owned(),
            base_folder: DEFAULT_BASE_FOLDER.to_owned(),
            retention_days: DEFAULT_RETENTION_DAYS,
            size_threshold_mb: DEFAULT_SIZE_THRESHOLD_MB,
            warning_percent: DEFAULT_WARNING_PERCENT,
            critical_percent: DEFAULT_CRITICAL_PERCENT,
            batch_size: DEFAULT_BATCH_SIZE,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}
