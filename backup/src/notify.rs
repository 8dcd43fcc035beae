//! Module dedicated to alert notifications.
//!
//! Notifications are fire-and-forget: a failed delivery is logged
//! and never propagated to the engine that triggered it.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::alert::MailboxAlert;

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to notifications.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot send notification: {0}")]
    SendNotificationError(String),
}

/// The notification capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &MailboxAlert, context: &str) -> Result<()>;
}

/// [`Notifier`] implementation that only logs.
#[derive(Clone, Debug, Default)]
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, alert: &MailboxAlert, context: &str) -> Result<()> {
        debug!(mailbox = alert.mailbox, kind = %alert.kind, context, "notification");
        Ok(())
    }
}

/// Sends a notification and swallows any failure.
pub(crate) async fn send_best_effort(notifier: &dyn Notifier, alert: &MailboxAlert, context: &str) {
    if let Err(err) = notifier.send(alert, context).await {
        warn!(mailbox = alert.mailbox, error = %err, "cannot send alert notification");
    }
}
