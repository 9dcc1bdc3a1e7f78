//! Notification triggers.
//!
//! The registry decides *when* someone must be told about a change; delivery belongs to a
//! [`NotificationSink`]. Sinks are fire-and-forget from the registry's point of view: a failed
//! delivery is logged and never undoes the write that triggered it.

use mdr_uuid::{ItemId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::{RegistryError, RegistryResult};

/// A single notification for one recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    /// User whose action caused the notification, when known.
    pub actor: Option<UserId>,
    pub verb: String,
    pub target: ItemId,
    pub description: Option<String>,
}

/// Delivery channel for notifications.
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Notification`] when delivery fails. Callers inside the registry
    /// log and discard this error.
    fn notify(&self, notification: &Notification) -> RegistryResult<()>;
}

/// Emits notifications as structured log events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: &Notification) -> RegistryResult<()> {
        tracing::info!(
            recipient = %n.recipient,
            actor = ?n.actor,
            target = %n.target,
            verb = %n.verb,
            description = n.description.as_deref().unwrap_or(""),
            "notification"
        );
        Ok(())
    }
}

/// Collects notifications in memory. Useful for tests and for callers that deliver in batches.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears everything received so far.
    pub fn drain(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(mut sent) => std::mem::take(&mut *sent),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, notification: &Notification) -> RegistryResult<()> {
        self.sent
            .lock()
            .map_err(|_| RegistryError::LockPoisoned)?
            .push(notification.clone());
        Ok(())
    }
}

/// Delivers to a sink, logging and swallowing any failure.
pub(crate) fn dispatch(sink: &dyn NotificationSink, notification: &Notification) {
    if let Err(err) = sink.notify(notification) {
        tracing::warn!(
            recipient = %notification.recipient,
            target = %notification.target,
            error = %err,
            "notification delivery failed"
        );
    }
}
