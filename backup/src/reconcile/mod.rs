//! Module dedicated to three-way reconciliation.
//!
//! Force-sync compares the local file, its backup record and the
//! cloud object, then picks one repair action per file. The decision
//! lives in the pure [`plan`] function so it can be tested without
//! touching any store; the [`ReconciliationEngine`] feeds it and
//! applies its verdict.

pub mod error;
pub mod report;

use std::{fmt, fs, io::Read, path::Path, sync::Arc};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{
    backend::{BackupEvent, BackupEventHandler},
    file::FileDescriptor,
    orchestrator::BackupOrchestrator,
    record::{BackupRecord, BackupStatus, RecordStore},
    transport::ObjectStore,
};

#[doc(inline)]
pub use self::{
    error::{Error, Result},
    report::ForceSyncReport,
};

/// Knobs of one force-sync run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReconcileOptions {
    /// Re-upload files whose cloud object went missing.
    pub repair: bool,

    /// Re-upload files modified since their last backup.
    pub update_modified: bool,

    /// Compare content checksums and re-upload on mismatch. Off by
    /// default, checksumming reads every file end to end.
    pub verify_checksum: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            repair: true,
            update_modified: true,
            verify_checksum: false,
        }
    }
}

/// The action [`plan`] picked for one file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReconcileAction {
    /// No record exists: back the file up from scratch.
    UploadMissing,

    /// The record claims a backup but the cloud object is gone:
    /// re-upload it.
    RepairCloud,

    /// The local file changed since its last backup: re-upload it.
    UploadModified,

    /// Local and cloud checksums disagree: re-upload.
    RepairChecksum,

    /// Everything agrees: stamp the record as verified.
    Verify,

    /// The file cannot be reconciled under the given options.
    Unrepairable(String),
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UploadMissing => write!(f, "upload missing backup"),
            Self::RepairCloud => write!(f, "repair missing cloud object"),
            Self::UploadModified => write!(f, "upload modified file"),
            Self::RepairChecksum => write!(f, "repair checksum mismatch"),
            Self::Verify => write!(f, "verify"),
            Self::Unrepairable(reason) => write!(f, "unrepairable: {reason}"),
        }
    }
}

/// The outcome of reconciling one file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconcileOutcome {
    /// A missing or corrupt backup was re-uploaded.
    Repaired,

    /// A modified file was re-uploaded.
    Updated,

    /// The backup was confirmed in agreement.
    Verified,

    /// The file could not be reconciled.
    Failed,
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repaired => write!(f, "repaired"),
            Self::Updated => write!(f, "updated"),
            Self::Verified => write!(f, "verified"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Picks the reconcile action for one file.
///
/// Rules apply in order: existence first (no record, then no cloud
/// object), modification time second, checksum last. A file with both
/// a missing cloud object and a stale checksum gets [`RepairCloud`],
/// never [`RepairChecksum`].
///
/// [`RepairCloud`]: ReconcileAction::RepairCloud
/// [`RepairChecksum`]: ReconcileAction::RepairChecksum
pub fn plan(
    file: &FileDescriptor,
    record: Option<&BackupRecord>,
    cloud_exists: bool,
    local_checksum: Option<&str>,
    remote_checksum: Option<&str>,
    opts: &ReconcileOptions,
) -> ReconcileAction {
    let record = match record {
        Some(record) if record.status != BackupStatus::Purged => record,
        _ => return ReconcileAction::UploadMissing,
    };

    if !cloud_exists {
        return if opts.repair {
            ReconcileAction::RepairCloud
        } else {
            ReconcileAction::Unrepairable(
                "cloud object missing and repair is disabled".into(),
            )
        };
    }

    if opts.update_modified && file.modified_at > record.updated_at {
        return ReconcileAction::UploadModified;
    }

    if opts.verify_checksum {
        if let (Some(local), Some(remote)) = (local_checksum, remote_checksum) {
            if !local.eq_ignore_ascii_case(remote) {
                return ReconcileAction::RepairChecksum;
            }
        }
    }

    ReconcileAction::Verify
}

/// Computes the hex-encoded SHA-256 checksum of a local file.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// The reconciliation engine.
pub struct ReconciliationEngine {
    orchestrator: Arc<BackupOrchestrator>,
    transport: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    handler: Option<Arc<BackupEventHandler>>,
}

impl ReconciliationEngine {
    pub fn new(
        orchestrator: Arc<BackupOrchestrator>,
        transport: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            orchestrator,
            transport,
            records,
            handler: None,
        }
    }

    pub fn with_some_handler(mut self, handler: Option<Arc<BackupEventHandler>>) -> Self {
        self.handler = handler;
        self
    }

    /// Reconciles every given file, aggregating per-file outcomes. A
    /// single failing file never aborts the batch.
    pub async fn force_sync(
        &self,
        mailbox: &str,
        files: &[FileDescriptor],
        opts: &ReconcileOptions,
    ) -> ForceSyncReport {
        let mut report = ForceSyncReport::default();

        for file in files {
            report.processed += 1;

            let outcome = match self.reconcile_file(mailbox, file, opts).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(path = %file.path.display(), error = %err, "cannot reconcile file");
                    ReconcileOutcome::Failed
                }
            };

            match outcome {
                ReconcileOutcome::Repaired => report.repaired += 1,
                ReconcileOutcome::Updated => report.updated += 1,
                ReconcileOutcome::Verified => report.verified += 1,
                ReconcileOutcome::Failed => report.failed += 1,
            }

            BackupEvent::ReconciledFile(file.path.clone(), outcome)
                .emit(&self.handler)
                .await;
        }

        report
    }

    async fn reconcile_file(
        &self,
        mailbox: &str,
        file: &FileDescriptor,
        opts: &ReconcileOptions,
    ) -> Result<ReconcileOutcome> {
        let record = self.records.find_by_path(&file.path).await?;

        // only probe the cloud when a record claims an object exists
        let cloud_exists = match &record {
            Some(record) if record.status != BackupStatus::Purged => {
                match self.transport.exists(&record.cloud_path).await {
                    Ok(exists) => exists,
                    Err(err) => {
                        warn!(
                            path = %file.path.display(),
                            error = %err,
                            "cannot probe cloud object, counting file as failed",
                        );
                        return Ok(ReconcileOutcome::Failed);
                    }
                }
            }
            _ => false,
        };

        let (local_checksum, remote_checksum) = if opts.verify_checksum && cloud_exists {
            let record = record.as_ref().map(|r| r.cloud_path.as_str());
            self.checksums(file, record).await
        } else {
            (None, None)
        };

        let action = plan(
            file,
            record.as_ref(),
            cloud_exists,
            local_checksum.as_deref(),
            remote_checksum.as_deref(),
            opts,
        );

        debug!(path = %file.path.display(), action = %action, "reconcile");

        match action {
            ReconcileAction::UploadMissing
            | ReconcileAction::RepairCloud
            | ReconcileAction::RepairChecksum => {
                self.orchestrator.force_backup_file(mailbox, file).await?;
                Ok(ReconcileOutcome::Repaired)
            }
            ReconcileAction::UploadModified => {
                self.orchestrator.force_backup_file(mailbox, file).await?;
                Ok(ReconcileOutcome::Updated)
            }
            ReconcileAction::Verify => {
                if let Some(mut record) = record {
                    record.last_verified_at = Some(chrono::Utc::now());
                    if record.checksum.is_none() {
                        record.checksum = local_checksum;
                    }
                    self.records.upsert(record).await?;
                }

                Ok(ReconcileOutcome::Verified)
            }
            ReconcileAction::Unrepairable(reason) => {
                warn!(path = %file.path.display(), reason, "file left unreconciled");
                Ok(ReconcileOutcome::Failed)
            }
        }
    }

    /// Fetches both checksums, swallowing individual failures: a
    /// checksum that cannot be computed simply opts the file out of
    /// checksum comparison.
    async fn checksums(
        &self,
        file: &FileDescriptor,
        cloud_path: Option<&str>,
    ) -> (Option<String>, Option<String>) {
        let local = match sha256_file(&file.path) {
            Ok(sum) => Some(sum),
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "cannot checksum local file");
                None
            }
        };

        let remote = match cloud_path {
            Some(path) => match self.transport.checksum(path).await {
                Ok(sum) => sum,
                Err(err) => {
                    warn!(cloud_path = path, error = %err, "cannot fetch cloud checksum");
                    None
                }
            },
            None => None,
        };

        (local, remote)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{Duration, Utc};

    use super::*;

    fn file(modified_at: chrono::DateTime<Utc>) -> FileDescriptor {
        FileDescriptor {
            path: PathBuf::from("/mail/user/1.eml"),
            size: 42,
            modified_at,
        }
    }

    fn completed_record(updated_at: chrono::DateTime<Utc>) -> BackupRecord {
        let mut record = BackupRecord::new("/mail/user/1.eml", "backups/1.eml", 42);
        record.status = BackupStatus::Completed;
        record.updated_at = updated_at;
        record
    }

    #[test]
    fn missing_record_plans_upload() {
        let now = Utc::now();
        let action = plan(
            &file(now),
            None,
            false,
            None,
            None,
            &ReconcileOptions::default(),
        );

        assert_eq!(action, ReconcileAction::UploadMissing);
    }

    #[test]
    fn missing_cloud_object_plans_repair() {
        let now = Utc::now();
        let record = completed_record(now);
        let action = plan(
            &file(now - Duration::hours(1)),
            Some(&record),
            false,
            None,
            None,
            &ReconcileOptions::default(),
        );

        assert_eq!(action, ReconcileAction::RepairCloud);
    }

    #[test]
    fn missing_cloud_object_without_repair_is_unrepairable() {
        let now = Utc::now();
        let record = completed_record(now);
        let opts = ReconcileOptions {
            repair: false,
            ..Default::default()
        };
        let action = plan(
            &file(now - Duration::hours(1)),
            Some(&record),
            false,
            None,
            None,
            &opts,
        );

        assert!(matches!(action, ReconcileAction::Unrepairable(_)));
    }

    #[test]
    fn existence_wins_over_checksum() {
        // a file with both a missing cloud object and a checksum
        // mismatch must be planned as a cloud repair
        let now = Utc::now();
        let record = completed_record(now);
        let opts = ReconcileOptions {
            verify_checksum: true,
            ..Default::default()
        };
        let action = plan(
            &file(now - Duration::hours(1)),
            Some(&record),
            false,
            Some("aaaa"),
            Some("bbbb"),
            &opts,
        );

        assert_eq!(action, ReconcileAction::RepairCloud);
    }

    #[test]
    fn modified_file_plans_update() {
        let now = Utc::now();
        let record = completed_record(now - Duration::hours(2));
        let action = plan(
            &file(now),
            Some(&record),
            true,
            None,
            None,
            &ReconcileOptions::default(),
        );

        assert_eq!(action, ReconcileAction::UploadModified);
    }

    #[test]
    fn checksum_mismatch_plans_repair() {
        let now = Utc::now();
        let record = completed_record(now);
        let opts = ReconcileOptions {
            verify_checksum: true,
            ..Default::default()
        };
        let action = plan(
            &file(now - Duration::hours(1)),
            Some(&record),
            true,
            Some("aaaa"),
            Some("bbbb"),
            &opts,
        );

        assert_eq!(action, ReconcileAction::RepairChecksum);
    }

    #[test]
    fn checksum_comparison_ignores_case() {
        let now = Utc::now();
        let record = completed_record(now);
        let opts = ReconcileOptions {
            verify_checksum: true,
            ..Default::default()
        };
        let action = plan(
            &file(now - Duration::hours(1)),
            Some(&record),
            true,
            Some("ABCD"),
            Some("abcd"),
            &opts,
        );

        assert_eq!(action, ReconcileAction::Verify);
    }

    #[test]
    fn agreement_plans_verify() {
        let now = Utc::now();
        let record = completed_record(now);
        let action = plan(
            &file(now - Duration::hours(1)),
            Some(&record),
            true,
            None,
            None,
            &ReconcileOptions::default(),
        );

        assert_eq!(action, ReconcileAction::Verify);
    }

    #[test]
    fn purged_record_plans_upload() {
        let now = Utc::now();
        let mut record = completed_record(now);
        record.status = BackupStatus::Purged;
        let action = plan(
            &file(now),
            Some(&record),
            false,
            None,
            None,
            &ReconcileOptions::default(),
        );

        assert_eq!(action, ReconcileAction::UploadMissing);
    }
}
