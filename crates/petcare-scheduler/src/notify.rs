//! Notification delivery.
//!
//! The scheduler talks to the display surface through [`Notifier`] and asks
//! [`PermissionGate`] whether it may post at all. Delivery is best-effort:
//! nothing in here can fail a fire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use dashmap::DashMap;
use petcare_core::{Notification, ReminderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the event stream; slow subscribers miss old events.
const EVENT_BUFFER: usize = 64;

/// One logical notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The user has not allowed visible notifications.
    #[error("notification permission denied")]
    PermissionDenied,

    #[error("notification channel missing: {channel_id}")]
    ChannelMissing { channel_id: String },

    #[error("notification surface unavailable: {0}")]
    Unavailable(String),
}

/// Display surface for reminder notifications.
pub trait Notifier: Send + Sync {
    /// Create the channel if absent. Returns `true` when it was created.
    fn ensure_channel(&self, spec: &ChannelSpec) -> Result<bool, NotifyError>;

    /// Delete a channel. Absent channels are not an error.
    fn delete_channel(&self, channel_id: &str) -> Result<(), NotifyError>;

    /// Show `notification`, replacing any visible one for the same reminder.
    fn post(&self, notification: Notification) -> Result<(), NotifyError>;

    /// Remove the visible notification for `id`, if any.
    fn dismiss(&self, id: ReminderId);
}

/// "May post notifications" capability.
pub trait PermissionGate: Send + Sync {
    fn may_post(&self) -> bool;
}

/// How a single delivery attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Posted,
    /// Permission denied; nothing shown.
    Suppressed,
    /// The surface rejected the post; logged and ignored.
    Failed,
}

/// Post `notification` if permitted. Never returns an error.
pub fn deliver(
    notifier: &dyn Notifier,
    gate: &dyn PermissionGate,
    notification: Notification,
) -> Delivery {
    let id = notification.reminder_id;
    if !gate.may_post() {
        debug!(reminder_id = %id, "notification permission denied, skipping post");
        return Delivery::Suppressed;
    }
    match notifier.post(notification) {
        Ok(()) => Delivery::Posted,
        Err(NotifyError::PermissionDenied) => {
            debug!(reminder_id = %id, "notification permission revoked, skipping post");
            Delivery::Suppressed
        }
        Err(e) => {
            warn!(reminder_id = %id, "notification post failed: {e}");
            Delivery::Failed
        }
    }
}

/// Events broadcast by [`NotificationCenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Posted(Notification),
    Dismissed(ReminderId),
}

/// In-process notification surface.
///
/// Keeps at most one visible notification per reminder and fans every change
/// out to subscribers (the CLI prints them).
pub struct NotificationCenter {
    channels: RwLock<HashMap<String, ChannelSpec>>,
    visible: DashMap<ReminderId, Notification>,
    granted: AtomicBool,
    events: broadcast::Sender<NotificationEvent>,
}

impl NotificationCenter {
    pub fn new(permission_granted: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            channels: RwLock::new(HashMap::new()),
            visible: DashMap::new(),
            granted: AtomicBool::new(permission_granted),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    /// Reminder ids with a visible notification.
    pub fn visible_ids(&self) -> Vec<ReminderId> {
        self.visible.iter().map(|entry| *entry.key()).collect()
    }

    pub fn visible(&self, id: ReminderId) -> Option<Notification> {
        self.visible.get(&id).map(|n| n.value().clone())
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    pub fn has_channel(&self, channel_id: &str) -> bool {
        self.channels
            .read()
            .expect("channel registry poisoned")
            .contains_key(channel_id)
    }

    fn emit(&self, event: NotificationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PermissionGate for NotificationCenter {
    fn may_post(&self) -> bool {
        self.granted.load(Ordering::Relaxed)
    }
}

impl Notifier for NotificationCenter {
    fn ensure_channel(&self, spec: &ChannelSpec) -> Result<bool, NotifyError> {
        let mut channels = self.channels.write().expect("channel registry poisoned");
        if channels.contains_key(&spec.id) {
            return Ok(false);
        }
        channels.insert(spec.id.clone(), spec.clone());
        info!(channel = %spec.id, "notification channel created");
        Ok(true)
    }

    fn delete_channel(&self, channel_id: &str) -> Result<(), NotifyError> {
        let removed = self
            .channels
            .write()
            .expect("channel registry poisoned")
            .remove(channel_id);
        if removed.is_some() {
            info!(channel = %channel_id, "notification channel deleted");
        }
        Ok(())
    }

    fn post(&self, notification: Notification) -> Result<(), NotifyError> {
        if !self.may_post() {
            return Err(NotifyError::PermissionDenied);
        }
        if !self.has_channel(&notification.channel_id) {
            return Err(NotifyError::ChannelMissing {
                channel_id: notification.channel_id,
            });
        }
        self.visible
            .insert(notification.reminder_id, notification.clone());
        self.emit(NotificationEvent::Posted(notification));
        Ok(())
    }

    fn dismiss(&self, id: ReminderId) {
        if self.visible.remove(&id).is_some() {
            self.emit(NotificationEvent::Dismissed(id));
        }
    }
}
