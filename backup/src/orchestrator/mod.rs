//! Module dedicated to backup orchestration.
//!
//! The [`BackupOrchestrator`] drives the initial backup and the
//! incremental sync of a mailbox, one file at a time. Files within a
//! batch are processed sequentially to keep upload state simple and
//! bound memory; concurrency happens across batches, in the outer
//! task queue.

pub mod error;
pub mod report;

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::{
    backend::{BackupEvent, BackupEventHandler},
    config::BackupConfig,
    file::FileDescriptor,
    record::{BackupRecord, BackupStatus, RecordStore},
    transport::ObjectStore,
};

#[doc(inline)]
pub use self::{
    error::{Error, Result},
    report::BatchReport,
};

/// The backup orchestrator.
pub struct BackupOrchestrator {
    transport: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    config: BackupConfig,
    handler: Option<Arc<BackupEventHandler>>,
}

impl BackupOrchestrator {
    pub fn new(
        transport: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        config: BackupConfig,
    ) -> Self {
        Self {
            transport,
            records,
            config,
            handler: None,
        }
    }

    pub fn with_some_handler(mut self, handler: Option<Arc<BackupEventHandler>>) -> Self {
        self.handler = handler;
        self
    }

    /// Builds the date-partitioned cloud path of a file:
    /// `base/yyyy/mm/dd/mailbox/filename`.
    pub fn cloud_path(base: &str, mailbox: &str, file_name: &str, date: NaiveDate) -> String {
        format!(
            "{base}/{:04}/{:02}/{:02}/{mailbox}/{file_name}",
            date.year(),
            date.month(),
            date.day()
        )
    }

    /// Backs up one file, idempotently.
    ///
    /// A record already `completed` short-circuits as success without
    /// touching the store. Otherwise the record goes through
    /// `processing` and ends in exactly one of `completed` or
    /// `failed`: a failure never leaves a partially applied status.
    pub async fn backup_file(&self, mailbox: &str, file: &FileDescriptor) -> Result<String> {
        self.backup_file_inner(mailbox, file, false).await
    }

    /// Same as [`Self::backup_file`] but re-uploads even when the
    /// record is already `completed`. Used by reconciliation.
    pub(crate) async fn force_backup_file(
        &self,
        mailbox: &str,
        file: &FileDescriptor,
    ) -> Result<String> {
        self.backup_file_inner(mailbox, file, true).await
    }

    async fn backup_file_inner(
        &self,
        mailbox: &str,
        file: &FileDescriptor,
        force: bool,
    ) -> Result<String> {
        let file_name = file
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidFileNameError(file.path.clone()))?;

        let existing = self.records.find_by_path(&file.path).await?;

        if let Some(record) = &existing {
            if record.status == BackupStatus::Completed && !force {
                debug!(path = %file.path.display(), "file already backed up");
                return Ok(record.cloud_path.clone());
            }
        }

        // retries reuse the cloud path picked by the first attempt
        let cloud_path = match &existing {
            Some(record) if !record.cloud_path.is_empty() => record.cloud_path.clone(),
            _ => Self::cloud_path(
                &self.config.base_folder,
                mailbox,
                file_name,
                Utc::now().date_naive(),
            ),
        };

        let retry_count = match &existing {
            Some(record) if record.status == BackupStatus::Failed => record.retry_count + 1,
            Some(record) => record.retry_count,
            None => 0,
        };

        let mut record = BackupRecord::new(&file.path, &cloud_path, file.size);
        record.status = BackupStatus::Processing;
        record.retry_count = retry_count;
        record.checksum = existing.as_ref().and_then(|r| r.checksum.clone());
        self.records.upsert(record.clone()).await?;

        match self.transport.upload(&file.path, &cloud_path, None).await {
            Ok(item) => {
                record.status = BackupStatus::Completed;
                record.size = if item.size > 0 { item.size } else { file.size };
                record.updated_at = Utc::now();
                record.error = None;
                self.records.upsert(record).await?;

                BackupEvent::BackedUpFile(file.path.clone())
                    .emit(&self.handler)
                    .await;

                Ok(cloud_path)
            }
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "cannot back up file");

                record.status = BackupStatus::Failed;
                record.updated_at = Utc::now();
                record.error = Some(err.to_string());
                self.records.upsert(record).await?;

                BackupEvent::FailedFile(file.path.clone(), err.to_string())
                    .emit(&self.handler)
                    .await;

                Err(Error::BackupFileError(err, file.path.clone()))
            }
        }
    }

    /// Backs up every given file, aggregating per-file outcomes. A
    /// single failing file never aborts the batch. `force` re-uploads
    /// files whose record is already `completed`.
    pub async fn initial_backup(
        &self,
        mailbox: &str,
        files: &[FileDescriptor],
        force: bool,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for batch in files.chunks(self.config.batch_size.max(1)) {
            debug!(mailbox, files = batch.len(), "processing backup batch");

            for file in batch {
                report.processed += 1;

                match self.backup_file_inner(mailbox, file, force).await {
                    Ok(_) => report.succeeded += 1,
                    Err(_) => report.failed += 1,
                }
            }
        }

        report
    }

    /// Backs up the files that are new or modified since the last
    /// sync. A file whose record is `completed` and whose
    /// modification time is not newer than the record is skipped; a
    /// modified file is re-uploaded.
    pub async fn sync_new(
        &self,
        mailbox: &str,
        files: &[FileDescriptor],
        since: Option<DateTime<Utc>>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for batch in files.chunks(self.config.batch_size.max(1)) {
            debug!(mailbox, files = batch.len(), "processing sync batch");

            for file in batch {
                report.processed += 1;

                if let Some(since) = since {
                    if file.modified_at <= since {
                        report.skipped += 1;
                        BackupEvent::SkippedFile(file.path.clone())
                            .emit(&self.handler)
                            .await;
                        continue;
                    }
                }

                match self.sync_file(mailbox, file).await {
                    Ok(true) => report.succeeded += 1,
                    Ok(false) => {
                        report.skipped += 1;
                        BackupEvent::SkippedFile(file.path.clone())
                            .emit(&self.handler)
                            .await;
                    }
                    Err(_) => report.failed += 1,
                }
            }
        }

        report
    }

    /// Syncs one file. Returns `Ok(false)` when the file was skipped
    /// as up to date.
    async fn sync_file(&self, mailbox: &str, file: &FileDescriptor) -> Result<bool> {
        let record = self.records.find_by_path(&file.path).await?;

        match record {
            Some(record)
                if record.status == BackupStatus::Completed
                    && file.modified_at <= record.updated_at =>
            {
                Ok(false)
            }
            Some(record) if record.status == BackupStatus::Completed => {
                // completed but modified since: re-upload
                self.force_backup_file(mailbox, file).await?;
                Ok(true)
            }
            _ => {
                self.backup_file(mailbox, file).await?;
                Ok(true)
            }
        }
    }
}
