mod common;

use std::sync::Arc;

use backup::{
    backend::BackendBuilder,
    file::LocalFileEnumerator,
    oplog::{MemoryOperationLog, OperationStatus, OperationType},
    record::{BackupStatus, MemoryRecordStore},
};
use chrono::{Duration, Utc};

use crate::common::{config, write_mail, FakeTransport};

const MIB: usize = 1024 * 1024;

#[test_log::test(tokio::test)]
async fn initial_backup_uploads_every_file_and_picks_the_upload_path_by_size() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::new(4 * MIB as u64);
    let records = Arc::new(MemoryRecordStore::new());
    let oplog = Arc::new(MemoryOperationLog::new());

    write_mail(dir.path(), "user@example.com", "1.eml", MIB);
    write_mail(dir.path(), "user@example.com", "2.eml", MIB);
    write_mail(dir.path(), "user@example.com", "3.eml", 10 * MIB);

    let backend = BackendBuilder::new(
        config(dir.path()),
        transport.clone(),
        records.clone(),
        Arc::new(LocalFileEnumerator::new()),
    )
    .with_operation_log(oplog.clone())
    .with_lock_dir(dir.path())
    .build();

    let (report, handle) = backend.initial_backup("user@example.com", false).await.unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);

    assert_eq!(transport.small_uploads.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(transport.large_uploads.load(std::sync::atomic::Ordering::SeqCst), 1);

    for record in records.all().unwrap() {
        assert_eq!(record.status, BackupStatus::Completed);
        assert!(record.cloud_path.starts_with("backups/"));
    }

    let entry = &oplog.entries().unwrap()[handle.0 as usize];
    assert_eq!(entry.kind, OperationType::InitialBackup);
    assert_eq!(entry.status, OperationStatus::Completed);
}

#[test_log::test(tokio::test)]
async fn backing_up_twice_uploads_once() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::new(4 * MIB as u64);
    let records = Arc::new(MemoryRecordStore::new());

    write_mail(dir.path(), "user@example.com", "1.eml", MIB);

    let backend = BackendBuilder::new(
        config(dir.path()),
        transport.clone(),
        records,
        Arc::new(LocalFileEnumerator::new()),
    )
    .with_lock_dir(dir.path())
    .build();

    backend.initial_backup("user@example.com", false).await.unwrap();
    let (report, _) = backend.initial_backup("user@example.com", false).await.unwrap();

    // the second run sees a completed record and does not re-upload
    assert_eq!(report.succeeded, 1);
    assert_eq!(transport.upload_count(), 1);

    // unless forced
    backend.initial_backup("user@example.com", true).await.unwrap();
    assert_eq!(transport.upload_count(), 2);
}

#[test_log::test(tokio::test)]
async fn a_failing_file_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::new(4 * MIB as u64);
    let records = Arc::new(MemoryRecordStore::new());
    let oplog = Arc::new(MemoryOperationLog::new());

    write_mail(dir.path(), "user@example.com", "1.eml", MIB);
    let failing = write_mail(dir.path(), "user@example.com", "2.eml", MIB);
    transport.fail_upload_of(&failing);

    let backend = BackendBuilder::new(
        config(dir.path()),
        transport.clone(),
        records.clone(),
        Arc::new(LocalFileEnumerator::new()),
    )
    .with_operation_log(oplog.clone())
    .with_lock_dir(dir.path())
    .build();

    let (report, handle) = backend.initial_backup("user@example.com", false).await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);

    let record = records.all().unwrap()[1].clone();
    assert_eq!(record.status, BackupStatus::Failed);
    assert!(record.error.is_some());

    let entry = &oplog.entries().unwrap()[handle.0 as usize];
    assert_eq!(entry.status, OperationStatus::CompletedWithErrors);
}

#[test_log::test(tokio::test)]
async fn sync_skips_files_older_than_the_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::new(4 * MIB as u64);
    let records = Arc::new(MemoryRecordStore::new());

    write_mail(dir.path(), "user@example.com", "old.eml", MIB);

    let backend = BackendBuilder::new(
        config(dir.path()),
        transport.clone(),
        records,
        Arc::new(LocalFileEnumerator::new()),
    )
    .with_lock_dir(dir.path())
    .build();

    let since = Utc::now() + Duration::hours(1);
    let (report, _) = backend.sync_new("user@example.com", Some(since)).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(transport.upload_count(), 0);
}

#[test_log::test(tokio::test)]
async fn a_failed_backup_retries_on_the_next_sync() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::new(4 * MIB as u64);
    let records = Arc::new(MemoryRecordStore::new());

    let path = write_mail(dir.path(), "user@example.com", "1.eml", MIB);
    transport.fail_upload_of(&path);

    let backend = BackendBuilder::new(
        config(dir.path()),
        transport.clone(),
        records.clone(),
        Arc::new(LocalFileEnumerator::new()),
    )
    .with_lock_dir(dir.path())
    .build();

    backend.initial_backup("user@example.com", false).await.unwrap();
    let failed = records.all().unwrap()[0].clone();
    assert_eq!(failed.status, BackupStatus::Failed);

    transport.failing.lock().unwrap().clear();
    let (report, _) = backend.sync_new("user@example.com", None).await.unwrap();

    assert_eq!(report.succeeded, 1);

    let record = records.all().unwrap()[0].clone();
    assert_eq!(record.status, BackupStatus::Completed);
    assert_eq!(record.retry_count, 1);
    // retries reuse the cloud path picked by the first attempt
    assert_eq!(record.cloud_path, failed.cloud_path);
}
