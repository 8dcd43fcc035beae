//! Module dedicated to the backup backend.
//!
//! The [`Backend`] is the library's front door: one method per
//! orchestrated operation, each acquiring the per-mailbox lock,
//! opening an operation log entry and writing its terminal state
//! exactly once. Backends are built with a [`BackendBuilder`], which
//! wires the stores and swaps defaults for the optional
//! collaborators.

pub mod report;

use std::{
    env, fmt,
    future::Future,
    path::PathBuf,
    pin::Pin,
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, trace, warn};

use crate::{
    alert::{AlertEngine, AlertKind, AlertStore, CheckOptions, CheckOutcome, MemoryAlertStore},
    config::BackupConfig,
    file::FileEnumerator,
    lock::MailboxLock,
    notify::{NoopNotifier, Notifier},
    oplog::{LogHandle, MemoryOperationLog, OperationLog, OperationStatus, OperationType},
    orchestrator::{BackupOrchestrator, BatchReport},
    purge::{PurgeEngine, PurgeReport},
    reconcile::{ForceSyncReport, ReconcileOptions, ReconcileOutcome, ReconciliationEngine},
    record::RecordStore,
    transport::ObjectStore,
    Result,
};

#[doc(inline)]
pub use self::report::SizeCheckReport;

/// The backup async event handler.
pub type BackupEventHandler =
    dyn Fn(BackupEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync;

/// The backup progress event.
///
/// Events are emitted by the engines while an operation runs, so a
/// caller can render progress. Emission is best-effort: a failing
/// handler is logged and never stops the operation.
#[derive(Clone, Debug)]
pub enum BackupEvent {
    /// A file was uploaded (or re-uploaded) to the cloud.
    BackedUpFile(PathBuf),

    /// A file was skipped as already up to date.
    SkippedFile(PathBuf),

    /// A file could not be backed up.
    FailedFile(PathBuf, String),

    /// A file went through reconciliation.
    ReconciledFile(PathBuf, ReconcileOutcome),

    /// A local file was deleted after its cloud backup was verified.
    PurgedFile(PathBuf, u64),

    /// A mailbox alert was raised or escalated.
    RaisedAlert(String, AlertKind),

    /// A mailbox alert was auto-resolved.
    ResolvedAlert(String),
}

impl BackupEvent {
    pub async fn emit(&self, handler: &Option<Arc<BackupEventHandler>>) {
        if let Some(handler) = handler.as_ref() {
            if let Err(err) = handler(self.clone()).await {
                debug!("error while emitting backup event: {err}");
                trace!("{err:?}");
            } else {
                debug!("emitted backup event {self:?}");
            }
        }
    }
}

impl fmt::Display for BackupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackedUpFile(path) => {
                write!(f, "backed up file {}", path.display())
            }
            Self::SkippedFile(path) => {
                write!(f, "skipped file {}", path.display())
            }
            Self::FailedFile(path, err) => {
                write!(f, "failed to back up file {}: {err}", path.display())
            }
            Self::ReconciledFile(path, outcome) => {
                write!(f, "reconciled file {} ({outcome})", path.display())
            }
            Self::PurgedFile(path, size) => {
                write!(f, "purged file {} ({size} bytes)", path.display())
            }
            Self::RaisedAlert(mailbox, kind) => {
                write!(f, "raised {kind} alert for mailbox {mailbox}")
            }
            Self::ResolvedAlert(mailbox) => {
                write!(f, "resolved alert for mailbox {mailbox}")
            }
        }
    }
}

/// The backup backend builder.
pub struct BackendBuilder {
    config: BackupConfig,
    transport: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    files: Arc<dyn FileEnumerator>,
    alerts: Arc<dyn AlertStore>,
    oplog: Arc<dyn OperationLog>,
    notifier: Arc<dyn Notifier>,
    handler: Option<Arc<BackupEventHandler>>,
    lock_dir: Option<PathBuf>,
    dry_run: Option<bool>,
}

impl BackendBuilder {
    /// Creates a new builder from the required collaborators. The
    /// alert store, operation log and notifier default to in-memory
    /// (resp. no-op) implementations.
    pub fn new(
        config: BackupConfig,
        transport: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        files: Arc<dyn FileEnumerator>,
    ) -> Self {
        Self {
            config,
            transport,
            records,
            files,
            alerts: Arc::new(MemoryAlertStore::new()),
            oplog: Arc::new(MemoryOperationLog::new()),
            notifier: Arc::new(NoopNotifier::new()),
            handler: None,
            lock_dir: None,
            dry_run: None,
        }
    }

    pub fn set_some_handler<F: Future<Output = Result<()>> + Send + 'static>(
        &mut self,
        handler: Option<impl Fn(BackupEvent) -> F + Send + Sync + 'static>,
    ) {
        self.handler = match handler {
            Some(handler) => Some(Arc::new(move |evt| Box::pin(handler(evt)))),
            None => None,
        };
    }

    pub fn set_handler<F: Future<Output = Result<()>> + Send + 'static>(
        &mut self,
        handler: impl Fn(BackupEvent) -> F + Send + Sync + 'static,
    ) {
        self.set_some_handler(Some(handler));
    }

    pub fn with_some_handler<F: Future<Output = Result<()>> + Send + 'static>(
        mut self,
        handler: Option<impl Fn(BackupEvent) -> F + Send + Sync + 'static>,
    ) -> Self {
        self.set_some_handler(handler);
        self
    }

    pub fn with_handler<F: Future<Output = Result<()>> + Send + 'static>(
        mut self,
        handler: impl Fn(BackupEvent) -> F + Send + Sync + 'static,
    ) -> Self {
        self.set_handler(handler);
        self
    }

    pub fn set_some_dry_run(&mut self, dry_run: Option<bool>) {
        self.dry_run = dry_run;
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.set_some_dry_run(Some(dry_run));
    }

    pub fn with_some_dry_run(mut self, dry_run: Option<bool>) -> Self {
        self.set_some_dry_run(dry_run);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.set_dry_run(dry_run);
        self
    }

    pub fn set_some_lock_dir(&mut self, dir: Option<impl Into<PathBuf>>) {
        self.lock_dir = dir.map(Into::into);
    }

    pub fn set_lock_dir(&mut self, dir: impl Into<PathBuf>) {
        self.set_some_lock_dir(Some(dir));
    }

    pub fn with_some_lock_dir(mut self, dir: Option<impl Into<PathBuf>>) -> Self {
        self.set_some_lock_dir(dir);
        self
    }

    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.set_lock_dir(dir);
        self
    }

    pub fn with_alert_store(mut self, alerts: Arc<dyn AlertStore>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_operation_log(mut self, oplog: Arc<dyn OperationLog>) -> Self {
        self.oplog = oplog;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Builds the backend, wiring the engines together.
    pub fn build(self) -> Backend {
        let orchestrator = Arc::new(
            BackupOrchestrator::new(
                self.transport.clone(),
                self.records.clone(),
                self.config.clone(),
            )
            .with_some_handler(self.handler.clone()),
        );

        let reconciler = ReconciliationEngine::new(
            orchestrator.clone(),
            self.transport.clone(),
            self.records.clone(),
        )
        .with_some_handler(self.handler.clone());

        let purger = PurgeEngine::new(
            self.transport.clone(),
            self.records.clone(),
            self.files.clone(),
        )
        .with_some_handler(self.handler.clone());

        let alerter = AlertEngine::new(
            self.alerts,
            self.notifier,
            self.config.warning_percent,
            self.config.critical_percent,
        )
        .with_some_handler(self.handler.clone());

        Backend {
            config: self.config,
            files: self.files,
            oplog: self.oplog,
            orchestrator,
            reconciler,
            purger,
            alerter,
            lock_dir: self.lock_dir.unwrap_or_else(env::temp_dir),
            dry_run: self.dry_run.unwrap_or_default(),
        }
    }
}

/// The backup backend.
pub struct Backend {
    config: BackupConfig,
    files: Arc<dyn FileEnumerator>,
    oplog: Arc<dyn OperationLog>,
    orchestrator: Arc<BackupOrchestrator>,
    reconciler: ReconciliationEngine,
    purger: PurgeEngine,
    alerter: AlertEngine,
    lock_dir: PathBuf,
    dry_run: bool,
}

impl Backend {
    /// Backs up every file of the given mailbox. `force` re-uploads
    /// files already backed up.
    pub async fn initial_backup(
        &self,
        mailbox: &str,
        force: bool,
    ) -> Result<(BatchReport, LogHandle)> {
        let _lock = MailboxLock::acquire(&self.lock_dir, mailbox, self.config.lock_ttl)?;
        let handle = self
            .oplog
            .start(OperationType::InitialBackup, mailbox.to_owned())
            .await?;

        info!(mailbox, "starting initial backup");

        let root = self.config.mailbox_root(mailbox);
        let files = match self.files.list(&root, None).await {
            Ok(files) => files,
            Err(err) => return self.fail(handle, err.into()).await,
        };

        let report = self.orchestrator.initial_backup(mailbox, &files, force).await;

        info!(mailbox, %report, "initial backup done");
        self.oplog
            .finish(handle, report.status(), report.to_string())
            .await?;

        Ok((report, handle))
    }

    /// Backs up the files of the given mailbox that are new or
    /// modified since the given instant.
    pub async fn sync_new(
        &self,
        mailbox: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<(BatchReport, LogHandle)> {
        let _lock = MailboxLock::acquire(&self.lock_dir, mailbox, self.config.lock_ttl)?;
        let handle = self
            .oplog
            .start(OperationType::IncrementalSync, mailbox.to_owned())
            .await?;

        info!(mailbox, since = ?since, "starting incremental sync");

        let root = self.config.mailbox_root(mailbox);
        let files = match self.files.list(&root, None).await {
            Ok(files) => files,
            Err(err) => return self.fail(handle, err.into()).await,
        };

        let report = self.orchestrator.sync_new(mailbox, &files, since).await;

        info!(mailbox, %report, "incremental sync done");
        self.oplog
            .finish(handle, report.status(), report.to_string())
            .await?;

        Ok((report, handle))
    }

    /// Reconciles every file of the given mailbox against its backup
    /// record and its cloud object.
    pub async fn force_sync(
        &self,
        mailbox: &str,
        opts: &ReconcileOptions,
    ) -> Result<(ForceSyncReport, LogHandle)> {
        let _lock = MailboxLock::acquire(&self.lock_dir, mailbox, self.config.lock_ttl)?;
        let handle = self
            .oplog
            .start(OperationType::ForceSync, mailbox.to_owned())
            .await?;

        info!(mailbox, "starting force sync");

        let root = self.config.mailbox_root(mailbox);
        let files = match self.files.list(&root, None).await {
            Ok(files) => files,
            Err(err) => return self.fail(handle, err.into()).await,
        };

        let report = self.reconciler.force_sync(mailbox, &files, opts).await;

        info!(mailbox, %report, "force sync done");
        self.oplog
            .finish(handle, report.status(), report.to_string())
            .await?;

        Ok((report, handle))
    }

    /// Purges the local files of the given mailbox whose backup is
    /// older than the retention and verified in the cloud.
    ///
    /// `retention_days` and `dry_run` default to the backend
    /// configuration when `None`.
    pub async fn purge_old(
        &self,
        mailbox: &str,
        retention_days: Option<i64>,
        dry_run: Option<bool>,
    ) -> Result<(PurgeReport, LogHandle)> {
        let _lock = MailboxLock::acquire(&self.lock_dir, mailbox, self.config.lock_ttl)?;
        let handle = self
            .oplog
            .start(OperationType::Purge, mailbox.to_owned())
            .await?;

        let retention = retention_days.unwrap_or(self.config.retention_days);
        let dry_run = dry_run.unwrap_or(self.dry_run);
        let cutoff = Utc::now() - Duration::days(retention);

        let root = self.config.mailbox_root(mailbox);
        let report = match self.purger.purge(mailbox, &root, cutoff, dry_run).await {
            Ok(report) => report,
            Err(err) => return self.fail(handle, err.into()).await,
        };

        info!(mailbox, %report, "purge done");
        self.oplog
            .finish(handle, report.status(), report.to_string())
            .await?;

        Ok((report, handle))
    }

    /// Checks the size of every given mailbox against the threshold,
    /// raising, escalating or auto-resolving alerts.
    ///
    /// `threshold_mb` defaults to the backend configuration when
    /// `None`. A mailbox whose size cannot be computed (or that is
    /// locked by another operation) counts as failed; the run keeps
    /// going.
    pub async fn check_sizes(
        &self,
        mailboxes: &[String],
        threshold_mb: Option<u64>,
        opts: &CheckOptions,
    ) -> Result<(SizeCheckReport, LogHandle)> {
        let handle = self
            .oplog
            .start(OperationType::SizeCheck, mailboxes.join(", "))
            .await?;

        let threshold = threshold_mb.unwrap_or(self.config.size_threshold_mb) * 1024 * 1024;
        let mut report = SizeCheckReport::default();

        for mailbox in mailboxes {
            report.checked += 1;

            match self.check_size(mailbox, threshold, opts).await {
                Ok(CheckOutcome::Breached(_)) => report.breached += 1,
                Ok(CheckOutcome::Resolved(_)) => report.resolved += 1,
                Ok(CheckOutcome::Unchanged) => (),
                Err(err) => {
                    warn!(mailbox, error = %err, "cannot check mailbox size");
                    report.failed += 1;
                }
            }
        }

        info!(%report, "size check done");
        self.oplog
            .finish(handle, report.status(), report.to_string())
            .await?;

        Ok((report, handle))
    }

    async fn check_size(
        &self,
        mailbox: &str,
        threshold: u64,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome> {
        let _lock = MailboxLock::acquire(&self.lock_dir, mailbox, self.config.lock_ttl)?;

        let root = self.config.mailbox_root(mailbox);
        let files = self.files.list(&root, None).await?;
        let size: u64 = files.iter().map(|file| file.size).sum();

        debug!(mailbox, size, threshold, "checked mailbox size");

        Ok(self
            .alerter
            .check_mailbox(mailbox, size, threshold, opts)
            .await?)
    }

    /// Returns the alert engine, for operator actions (acknowledge,
    /// resolve, ignore, reactivate).
    pub fn alerts(&self) -> &AlertEngine {
        &self.alerter
    }

    /// Writes the `Failed` terminal state of an operation that could
    /// not run at all, then propagates its error.
    async fn fail<T>(&self, handle: LogHandle, err: crate::Error) -> Result<T> {
        self.oplog
            .finish(handle, OperationStatus::Failed, err.to_string())
            .await?;

        Err(err)
    }
}
