mod common;

use std::sync::Arc;

use backup::{
    alert::{AlertKind, AlertStatus, CheckOptions, MemoryAlertStore},
    backend::BackendBuilder,
    file::LocalFileEnumerator,
    record::MemoryRecordStore,
};

use crate::common::{config, write_mail, FakeTransport};

const MIB: usize = 1024 * 1024;

fn backend(
    dir: &tempfile::TempDir,
    alerts: Arc<MemoryAlertStore>,
) -> backup::Backend {
    BackendBuilder::new(
        config(dir.path()),
        FakeTransport::new(4 * MIB as u64),
        Arc::new(MemoryRecordStore::new()),
        Arc::new(LocalFileEnumerator::new()),
    )
    .with_alert_store(alerts)
    .with_lock_dir(dir.path())
    .build()
}

#[test_log::test(tokio::test)]
async fn repeated_breaches_keep_a_single_open_alert() {
    let dir = tempfile::tempdir().unwrap();
    let alerts = Arc::new(MemoryAlertStore::new());
    let backend = backend(&dir, alerts.clone());

    // 9 MiB of mail against a 10 MiB threshold: 90%, warning band
    write_mail(dir.path(), "user@example.com", "1.eml", 9 * MIB);

    let mailboxes = vec!["user@example.com".to_owned()];
    let opts = CheckOptions::default();

    for _ in 0..3 {
        let (report, _) = backend
            .check_sizes(&mailboxes, Some(10), &opts)
            .await
            .unwrap();
        assert_eq!(report.breached, 1);
    }

    let all = alerts.all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].kind, AlertKind::SizeWarning);
    assert_eq!(all[0].status, AlertStatus::Active);
}

#[test_log::test(tokio::test)]
async fn a_growing_mailbox_escalates_its_open_alert_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let alerts = Arc::new(MemoryAlertStore::new());
    let backend = backend(&dir, alerts.clone());

    write_mail(dir.path(), "user@example.com", "1.eml", 9 * MIB);

    let mailboxes = vec!["user@example.com".to_owned()];
    let opts = CheckOptions::default();

    backend
        .check_sizes(&mailboxes, Some(10), &opts)
        .await
        .unwrap();

    // past the threshold entirely: the same alert becomes
    // purge_required
    write_mail(dir.path(), "user@example.com", "2.eml", 2 * MIB);
    backend
        .check_sizes(&mailboxes, Some(10), &opts)
        .await
        .unwrap();

    let all = alerts.all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].kind, AlertKind::PurgeRequired);
}

#[test_log::test(tokio::test)]
async fn a_shrinking_mailbox_auto_resolves_its_alert() {
    let dir = tempfile::tempdir().unwrap();
    let alerts = Arc::new(MemoryAlertStore::new());
    let backend = backend(&dir, alerts.clone());

    let path = write_mail(dir.path(), "user@example.com", "1.eml", 9 * MIB);

    let mailboxes = vec!["user@example.com".to_owned()];
    let opts = CheckOptions::default();

    backend
        .check_sizes(&mailboxes, Some(10), &opts)
        .await
        .unwrap();
    assert_eq!(alerts.all().unwrap()[0].status, AlertStatus::Active);

    std::fs::remove_file(path).unwrap();
    let (report, _) = backend
        .check_sizes(&mailboxes, Some(10), &opts)
        .await
        .unwrap();

    assert_eq!(report.breached, 0);
    assert_eq!(report.resolved, 1);
    let alert = alerts.all().unwrap()[0].clone();
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert!(alert.resolved_at.is_some());
}

#[test_log::test(tokio::test)]
async fn a_shrinking_but_breaching_mailbox_downgrades_its_severity() {
    let dir = tempfile::tempdir().unwrap();
    let alerts = Arc::new(MemoryAlertStore::new());
    let backend = backend(&dir, alerts.clone());

    // 11 MiB against 10 MiB: purge_required
    write_mail(dir.path(), "user@example.com", "1.eml", 11 * MIB);

    let mailboxes = vec!["user@example.com".to_owned()];
    let opts = CheckOptions::default();

    backend
        .check_sizes(&mailboxes, Some(10), &opts)
        .await
        .unwrap();
    assert_eq!(alerts.all().unwrap()[0].kind, AlertKind::PurgeRequired);

    // back into the warning band: the same alert is re-stated with
    // the current severity
    write_mail(dir.path(), "user@example.com", "1.eml", 9 * MIB);
    let (report, _) = backend
        .check_sizes(&mailboxes, Some(10), &opts)
        .await
        .unwrap();

    assert_eq!(report.breached, 1);
    let all = alerts.all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].kind, AlertKind::SizeWarning);
    assert_eq!(all[0].status, AlertStatus::Active);
}

#[test_log::test(tokio::test)]
async fn an_operator_can_acknowledge_then_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let alerts = Arc::new(MemoryAlertStore::new());
    let backend = backend(&dir, alerts.clone());

    write_mail(dir.path(), "user@example.com", "1.eml", 9 * MIB);

    let mailboxes = vec!["user@example.com".to_owned()];
    backend
        .check_sizes(&mailboxes, Some(10), &CheckOptions::default())
        .await
        .unwrap();

    let id = alerts.all().unwrap()[0].id;

    let alert = backend
        .alerts()
        .acknowledge(id, "ops", Some("purge scheduled".into()))
        .await
        .unwrap();
    assert_eq!(alert.status, AlertStatus::Acknowledged);
    assert_eq!(alert.acknowledged_by.as_deref(), Some("ops"));

    // an acknowledged alert still counts as open: no new alert stacks
    backend
        .check_sizes(&mailboxes, Some(10), &CheckOptions::default())
        .await
        .unwrap();
    assert_eq!(alerts.all().unwrap().len(), 1);

    let alert = backend.alerts().resolve(id).await.unwrap();
    assert_eq!(alert.status, AlertStatus::Resolved);
}

#[test_log::test(tokio::test)]
async fn an_ignored_alert_can_be_reactivated() {
    let dir = tempfile::tempdir().unwrap();
    let alerts = Arc::new(MemoryAlertStore::new());
    let backend = backend(&dir, alerts.clone());

    write_mail(dir.path(), "user@example.com", "1.eml", 9 * MIB);

    let mailboxes = vec!["user@example.com".to_owned()];
    backend
        .check_sizes(&mailboxes, Some(10), &CheckOptions::default())
        .await
        .unwrap();

    let id = alerts.all().unwrap()[0].id;

    backend.alerts().ignore(id).await.unwrap();
    assert_eq!(alerts.all().unwrap()[0].status, AlertStatus::Ignored);

    let alert = backend.alerts().reactivate(id).await.unwrap();
    assert_eq!(alert.status, AlertStatus::Active);
}

#[test_log::test(tokio::test)]
async fn disabling_resolve_keeps_the_alert_open() {
    let dir = tempfile::tempdir().unwrap();
    let alerts = Arc::new(MemoryAlertStore::new());
    let backend = backend(&dir, alerts.clone());

    let path = write_mail(dir.path(), "user@example.com", "1.eml", 9 * MIB);

    let mailboxes = vec!["user@example.com".to_owned()];
    backend
        .check_sizes(&mailboxes, Some(10), &CheckOptions::default())
        .await
        .unwrap();

    std::fs::remove_file(path).unwrap();

    let opts = CheckOptions {
        resolve: false,
        ..Default::default()
    };
    backend
        .check_sizes(&mailboxes, Some(10), &opts)
        .await
        .unwrap();

    assert_eq!(alerts.all().unwrap()[0].status, AlertStatus::Active);
}
