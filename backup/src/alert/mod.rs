//! Module dedicated to mailbox size alerts.
//!
//! When a mailbox grows past its size threshold, an alert is raised
//! and kept open until an operator acts on it or the size drops back
//! under the threshold. At most one open alert exists per mailbox: a
//! repeated breach escalates the open alert in place instead of
//! stacking a new one.

pub mod error;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    backend::{BackupEvent, BackupEventHandler},
    notify::{self, Notifier},
};

#[doc(inline)]
pub use self::error::{Error, Result};

/// The severity of a mailbox alert, from mild to worst.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum AlertKind {
    /// The mailbox crossed the warning band of its threshold.
    SizeWarning,

    /// The mailbox crossed the critical band of its threshold.
    SizeCritical,

    /// The mailbox reached or exceeded its threshold: purging is
    /// required.
    PurgeRequired,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeWarning => write!(f, "size_warning"),
            Self::SizeCritical => write!(f, "size_critical"),
            Self::PurgeRequired => write!(f, "purge_required"),
        }
    }
}

/// The lifecycle status of a mailbox alert.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum AlertStatus {
    /// Raised and waiting for an operator.
    Active,

    /// Seen by an operator, still open.
    Acknowledged,

    /// Closed because the condition cleared.
    Resolved,

    /// Closed by an operator who chose not to act.
    Ignored,
}

impl AlertStatus {
    /// Whether the alert still counts against the one-open-alert
    /// uniqueness rule.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Acknowledged)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Resolved => write!(f, "resolved"),
            Self::Ignored => write!(f, "ignored"),
        }
    }
}

/// Maps a mailbox size to an alert severity, `None` meaning no
/// breach. A zero threshold disables alerting entirely.
pub fn severity(
    current_size: u64,
    threshold: u64,
    warning_percent: f64,
    critical_percent: f64,
) -> Option<AlertKind> {
    if threshold == 0 {
        return None;
    }

    let percent = current_size as f64 / threshold as f64 * 100.0;

    if percent >= 100.0 {
        Some(AlertKind::PurgeRequired)
    } else if percent >= critical_percent {
        Some(AlertKind::SizeCritical)
    } else if percent >= warning_percent {
        Some(AlertKind::SizeWarning)
    } else {
        None
    }
}

/// A mailbox size alert.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct MailboxAlert {
    /// Store-assigned identifier.
    pub id: u64,

    /// The mailbox the alert is about.
    pub mailbox: String,

    /// Mailbox size at the last size check, in bytes.
    pub current_size: u64,

    /// Size threshold of the mailbox, in bytes.
    pub threshold: u64,

    /// Current severity of the alert.
    pub kind: AlertKind,

    /// Current lifecycle status of the alert.
    pub status: AlertStatus,

    /// Operator who acknowledged the alert, when one did.
    pub acknowledged_by: Option<String>,

    /// Free-form operator notes.
    pub notes: Option<String>,

    /// When the alert was first raised.
    pub created_at: DateTime<Utc>,

    /// When the alert was last re-stated.
    pub updated_at: DateTime<Utc>,

    /// When the alert was closed, when it was.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl MailboxAlert {
    /// Moves the alert to the given status, validating the
    /// transition.
    ///
    /// Open statuses move forward (`active` to `acknowledged`,
    /// anything open to `resolved` or `ignored`); closed statuses only
    /// reopen to `active`.
    pub fn transition(&mut self, to: AlertStatus) -> Result<()> {
        let valid = match (self.status, to) {
            (AlertStatus::Active, AlertStatus::Acknowledged) => true,
            (AlertStatus::Active, AlertStatus::Resolved) => true,
            (AlertStatus::Active, AlertStatus::Ignored) => true,
            (AlertStatus::Acknowledged, AlertStatus::Resolved) => true,
            (AlertStatus::Acknowledged, AlertStatus::Ignored) => true,
            (AlertStatus::Resolved, AlertStatus::Active) => true,
            (AlertStatus::Ignored, AlertStatus::Active) => true,
            _ => false,
        };

        if !valid {
            return Err(Error::InvalidTransitionError(self.status, to));
        }

        self.status = to;
        self.updated_at = Utc::now();
        self.resolved_at = match to {
            AlertStatus::Resolved | AlertStatus::Ignored => Some(self.updated_at),
            _ => None,
        };

        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

impl fmt::Display for MailboxAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} alert for {} ({}/{} bytes, {})",
            self.kind, self.mailbox, self.current_size, self.threshold, self.status,
        )
    }
}

/// The draft of a new alert, before the store assigns it an id.
#[derive(Clone, Debug)]
pub struct NewAlert {
    pub mailbox: String,
    pub current_size: u64,
    pub threshold: u64,
    pub kind: AlertKind,
}

/// The alert persistence seam.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Finds the open (active or acknowledged) alert of the given
    /// mailbox, if any.
    async fn find_open_by_mailbox(&self, mailbox: &str) -> Result<Option<MailboxAlert>>;

    /// Finds an alert by id.
    async fn find(&self, id: u64) -> Result<Option<MailboxAlert>>;

    /// Persists a new active alert, assigning its id.
    async fn create(&self, alert: NewAlert) -> Result<MailboxAlert>;

    /// Re-states an existing alert.
    async fn update(&self, alert: MailboxAlert) -> Result<()>;
}

/// In-memory [`AlertStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    alerts: Mutex<HashMap<u64, MailboxAlert>>,
    next_id: Mutex<u64>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all alerts, sorted by id.
    pub fn all(&self) -> Result<Vec<MailboxAlert>> {
        let alerts = lock(&self.alerts)?;
        let mut alerts: Vec<_> = alerts.values().cloned().collect();
        alerts.sort_by_key(|alert| alert.id);
        Ok(alerts)
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn find_open_by_mailbox(&self, mailbox: &str) -> Result<Option<MailboxAlert>> {
        let alerts = lock(&self.alerts)?;
        Ok(alerts
            .values()
            .find(|alert| alert.mailbox == mailbox && alert.is_open())
            .cloned())
    }

    async fn find(&self, id: u64) -> Result<Option<MailboxAlert>> {
        let alerts = lock(&self.alerts)?;
        Ok(alerts.get(&id).cloned())
    }

    async fn create(&self, alert: NewAlert) -> Result<MailboxAlert> {
        let id = {
            let mut next_id = lock(&self.next_id)?;
            *next_id += 1;
            *next_id
        };

        let now = Utc::now();
        let alert = MailboxAlert {
            id,
            mailbox: alert.mailbox,
            current_size: alert.current_size,
            threshold: alert.threshold,
            kind: alert.kind,
            status: AlertStatus::Active,
            acknowledged_by: None,
            notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };

        let mut alerts = lock(&self.alerts)?;
        alerts.insert(id, alert.clone());

        Ok(alert)
    }

    async fn update(&self, alert: MailboxAlert) -> Result<()> {
        let mut alerts = lock(&self.alerts)?;

        if !alerts.contains_key(&alert.id) {
            return Err(Error::AlertNotFoundError(alert.id));
        }

        alerts.insert(alert.id, alert);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex.lock().map_err(|err| Error::StorageError(err.to_string()))
}

/// Knobs of one size check run.
#[derive(Clone, Copy, Debug)]
pub struct CheckOptions {
    /// Raise (or escalate) alerts on threshold breach.
    pub raise: bool,

    /// Auto-resolve open alerts when the size dropped back under the
    /// threshold.
    pub resolve: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            raise: true,
            resolve: true,
        }
    }
}

/// The outcome of one mailbox size check.
#[derive(Clone, Debug)]
pub enum CheckOutcome {
    /// The threshold is breached; the open alert after the check.
    Breached(MailboxAlert),

    /// The size dropped back and the open alert was auto-resolved.
    Resolved(MailboxAlert),

    /// Nothing to raise nor to resolve.
    Unchanged,
}

/// The alert engine.
pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
    warning_percent: f64,
    critical_percent: f64,
    handler: Option<Arc<BackupEventHandler>>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
        warning_percent: f64,
        critical_percent: f64,
    ) -> Self {
        Self {
            store,
            notifier,
            warning_percent,
            critical_percent,
            handler: None,
        }
    }

    pub fn with_some_handler(mut self, handler: Option<Arc<BackupEventHandler>>) -> Self {
        self.handler = handler;
        self
    }

    /// Checks one mailbox size against its threshold, raising,
    /// escalating or auto-resolving its alert as needed.
    ///
    /// A repeated breach re-states the open alert in place, moving its
    /// severity to the current band. Notifications go out when an
    /// alert is first raised and on severity escalation, never on
    /// repeated identical breaches nor on a de-escalation.
    pub async fn check_mailbox(
        &self,
        mailbox: &str,
        current_size: u64,
        threshold: u64,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome> {
        let kind = severity(
            current_size,
            threshold,
            self.warning_percent,
            self.critical_percent,
        );
        let open = self.store.find_open_by_mailbox(mailbox).await?;

        match (kind, open) {
            (Some(kind), Some(mut alert)) => {
                let escalated = kind > alert.kind;

                alert.current_size = current_size;
                alert.threshold = threshold;
                alert.kind = kind;
                alert.updated_at = Utc::now();
                self.store.update(alert.clone()).await?;

                if escalated {
                    info!(mailbox, kind = %alert.kind, "mailbox alert escalated");
                    notify::send_best_effort(&*self.notifier, &alert, "alert escalated").await;
                    BackupEvent::RaisedAlert(mailbox.to_owned(), alert.kind)
                        .emit(&self.handler)
                        .await;
                } else {
                    debug!(mailbox, kind = %alert.kind, "mailbox alert still open");
                }

                Ok(CheckOutcome::Breached(alert))
            }
            (Some(kind), None) if opts.raise => {
                let alert = self
                    .store
                    .create(NewAlert {
                        mailbox: mailbox.to_owned(),
                        current_size,
                        threshold,
                        kind,
                    })
                    .await?;

                warn!(mailbox, kind = %kind, current_size, threshold, "mailbox alert raised");
                notify::send_best_effort(&*self.notifier, &alert, "alert raised").await;
                BackupEvent::RaisedAlert(mailbox.to_owned(), kind)
                    .emit(&self.handler)
                    .await;

                Ok(CheckOutcome::Breached(alert))
            }
            (Some(_), None) => Ok(CheckOutcome::Unchanged),
            (None, Some(mut alert)) if opts.resolve => {
                alert.current_size = current_size;
                alert.transition(AlertStatus::Resolved)?;
                self.store.update(alert.clone()).await?;

                info!(mailbox, "mailbox alert auto-resolved");
                BackupEvent::ResolvedAlert(mailbox.to_owned())
                    .emit(&self.handler)
                    .await;

                Ok(CheckOutcome::Resolved(alert))
            }
            (None, _) => Ok(CheckOutcome::Unchanged),
        }
    }

    /// Acknowledges an alert on behalf of an operator.
    pub async fn acknowledge(
        &self,
        id: u64,
        operator: impl ToString,
        notes: Option<String>,
    ) -> Result<MailboxAlert> {
        let mut alert = self.get(id).await?;

        alert.transition(AlertStatus::Acknowledged)?;
        alert.acknowledged_by = Some(operator.to_string());
        if notes.is_some() {
            alert.notes = notes;
        }
        self.store.update(alert.clone()).await?;

        Ok(alert)
    }

    /// Resolves an alert by hand.
    pub async fn resolve(&self, id: u64) -> Result<MailboxAlert> {
        let mut alert = self.get(id).await?;

        alert.transition(AlertStatus::Resolved)?;
        self.store.update(alert.clone()).await?;

        Ok(alert)
    }

    /// Ignores an alert: closes it without acting on it.
    pub async fn ignore(&self, id: u64) -> Result<MailboxAlert> {
        let mut alert = self.get(id).await?;

        alert.transition(AlertStatus::Ignored)?;
        self.store.update(alert.clone()).await?;

        Ok(alert)
    }

    /// Reopens a closed alert.
    pub async fn reactivate(&self, id: u64) -> Result<MailboxAlert> {
        let mut alert = self.get(id).await?;

        alert.transition(AlertStatus::Active)?;
        self.store.update(alert.clone()).await?;

        Ok(alert)
    }

    async fn get(&self, id: u64) -> Result<MailboxAlert> {
        self.store
            .find(id)
            .await?
            .ok_or(Error::AlertNotFoundError(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_maps_to_bands() {
        assert_eq!(severity(850, 1000, 80.0, 95.0), Some(AlertKind::SizeWarning));
        assert_eq!(
            severity(960, 1000, 80.0, 95.0),
            Some(AlertKind::SizeCritical)
        );
        assert_eq!(
            severity(1000, 1000, 80.0, 95.0),
            Some(AlertKind::PurgeRequired)
        );
        assert_eq!(
            severity(1500, 1000, 80.0, 95.0),
            Some(AlertKind::PurgeRequired)
        );
        assert_eq!(severity(799, 1000, 80.0, 95.0), None);
    }

    #[test]
    fn zero_threshold_disables_alerting() {
        assert_eq!(severity(u64::MAX, 0, 80.0, 95.0), None);
    }

    #[test]
    fn kinds_order_by_severity() {
        assert!(AlertKind::SizeWarning < AlertKind::SizeCritical);
        assert!(AlertKind::SizeCritical < AlertKind::PurgeRequired);
    }

    #[test]
    fn open_statuses_move_forward() {
        let mut alert = alert(AlertStatus::Active);
        alert.transition(AlertStatus::Acknowledged).unwrap();
        alert.transition(AlertStatus::Resolved).unwrap();

        assert_eq!(alert.status, AlertStatus::Resolved);
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn closed_statuses_only_reopen() {
        let mut resolved = alert(AlertStatus::Resolved);
        assert!(resolved.transition(AlertStatus::Acknowledged).is_err());
        assert!(resolved.transition(AlertStatus::Active).is_ok());
        assert!(resolved.resolved_at.is_none());

        let mut ignored = alert(AlertStatus::Ignored);
        assert!(ignored.transition(AlertStatus::Resolved).is_err());
        assert!(ignored.transition(AlertStatus::Active).is_ok());
    }

    #[test]
    fn acknowledged_cannot_go_back_to_active() {
        let mut alert = alert(AlertStatus::Acknowledged);
        assert!(alert.transition(AlertStatus::Active).is_err());
    }

    fn alert(status: AlertStatus) -> MailboxAlert {
        let now = Utc::now();
        MailboxAlert {
            id: 1,
            mailbox: "user@example.com".into(),
            current_size: 960,
            threshold: 1000,
            kind: AlertKind::SizeCritical,
            status,
            acknowledged_by: None,
            notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }
}
