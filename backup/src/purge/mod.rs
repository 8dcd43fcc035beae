//! Module dedicated to the local purge.
//!
//! Purging reclaims mail server disk space by deleting local files
//! whose cloud backup is old enough and verified. The safety protocol
//! is strict: a file is deleted only when its record is `completed`
//! AND the cloud object is confirmed reachable at purge time. Any
//! doubt leaves the file on disk.

pub mod error;
pub mod report;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    backend::{BackupEvent, BackupEventHandler},
    file::{FileDescriptor, FileEnumerator},
    record::{BackupStatus, RecordStore},
    transport::ObjectStore,
};

#[doc(inline)]
pub use self::{
    error::{Error, Result},
    report::PurgeReport,
};

/// The purge engine.
pub struct PurgeEngine {
    transport: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    files: Arc<dyn FileEnumerator>,
    handler: Option<Arc<BackupEventHandler>>,
}

impl PurgeEngine {
    pub fn new(
        transport: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        files: Arc<dyn FileEnumerator>,
    ) -> Self {
        Self {
            transport,
            records,
            files,
            handler: None,
        }
    }

    pub fn with_some_handler(mut self, handler: Option<Arc<BackupEventHandler>>) -> Self {
        self.handler = handler;
        self
    }

    /// Purges the files of the given mailbox older than the cutoff.
    ///
    /// Dry-run goes through the exact same eligibility checks as a
    /// real purge, including the cloud existence probe, and only skips
    /// the deletion itself. Failing to enumerate candidates fails the
    /// whole run; per-file doubts only mark that file as failed.
    pub async fn purge(
        &self,
        mailbox: &str,
        root: &std::path::Path,
        cutoff: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<PurgeReport> {
        let candidates = self.files.older_than(root, cutoff).await?;

        info!(
            mailbox,
            candidates = candidates.len(),
            cutoff = %cutoff,
            dry_run,
            "starting purge",
        );

        let mut report = PurgeReport {
            dry_run,
            ..Default::default()
        };

        for file in &candidates {
            report.examined += 1;

            if !self.is_eligible(file).await {
                report.failed += 1;
                continue;
            }

            if dry_run {
                debug!(path = %file.path.display(), "would purge file");
                report.purged += 1;
                report.reclaimed_bytes += file.size;
                continue;
            }

            match self.files.delete(&file.path).await {
                Ok(true) => {
                    self.records.mark_purged(&file.path).await?;
                    report.purged += 1;
                    report.reclaimed_bytes += file.size;

                    BackupEvent::PurgedFile(file.path.clone(), file.size)
                        .emit(&self.handler)
                        .await;
                }
                Ok(false) => {
                    warn!(
                        path = %file.path.display(),
                        "local delete refused, record left completed",
                    );
                    report.failed += 1;
                }
                Err(err) => {
                    warn!(
                        path = %file.path.display(),
                        error = %err,
                        "cannot delete local file, record left completed",
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Checks the purge eligibility of one candidate: a `completed`
    /// record and a cloud object confirmed reachable right now.
    async fn is_eligible(&self, file: &FileDescriptor) -> bool {
        let record = match self.records.find_by_path(&file.path).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(path = %file.path.display(), "no backup record, skipping purge");
                return false;
            }
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "cannot read backup record");
                return false;
            }
        };

        if record.status != BackupStatus::Completed {
            warn!(
                path = %file.path.display(),
                status = %record.status,
                "backup not completed, skipping purge",
            );
            return false;
        }

        match self.transport.exists(&record.cloud_path).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    path = %file.path.display(),
                    cloud_path = record.cloud_path,
                    "cloud object missing, skipping purge",
                );
                false
            }
            Err(err) => {
                warn!(
                    path = %file.path.display(),
                    error = %err,
                    "cannot confirm cloud object, skipping purge",
                );
                false
            }
        }
    }
}
