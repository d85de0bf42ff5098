//! Reminder delivery types, shared between the scheduler, the timer backend
//! and whatever surface displays notifications.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ReminderId;

/// Text used whenever a title or due time is unavailable.
pub const FALLBACK_TEXT: &str = "Reminder";

/// Display format for due times, e.g. `Mon 3 Feb, 9:05 AM`.
const DUE_FORMAT: &str = "%a %-d %b, %-I:%M %p";

/// Snapshot stored as JSON in the `timers.payload` column.
///
/// Captured when the reminder is scheduled; the fire handler only ever sees
/// this snapshot, never the live store row. Every field has a default so an
/// incomplete stored payload still decodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPayload {
    #[serde(default = "unknown_id")]
    pub id: ReminderId,
    #[serde(default = "fallback_text")]
    pub title: String,
    /// Due time rendered at schedule time.
    #[serde(default = "fallback_text")]
    pub text: String,
    /// Zero or negative means non-repeating.
    #[serde(default)]
    pub repeat_minutes: i64,
}

impl TimerPayload {
    pub fn new(id: ReminderId, title: &str, text: String, repeat_minutes: Option<i64>) -> Self {
        Self {
            id,
            title: title.to_string(),
            text,
            repeat_minutes: repeat_minutes.unwrap_or(0),
        }
    }

    /// Decode a stored payload, falling back to defaults instead of failing.
    ///
    /// `fallback_id` comes from the timer row itself and is used when the JSON
    /// is unreadable or lacks an id.
    pub fn decode_lossy(raw: &str, fallback_id: ReminderId) -> Self {
        match serde_json::from_str::<TimerPayload>(raw) {
            Ok(mut payload) => {
                if payload.id == unknown_id() {
                    payload.id = fallback_id;
                }
                if payload.title.trim().is_empty() {
                    payload.title = fallback_text();
                }
                if payload.text.trim().is_empty() {
                    payload.text = fallback_text();
                }
                payload
            }
            Err(e) => {
                tracing::warn!(reminder_id = %fallback_id, "undecodable timer payload, using defaults: {e}");
                Self {
                    id: fallback_id,
                    title: fallback_text(),
                    text: fallback_text(),
                    repeat_minutes: 0,
                }
            }
        }
    }

    pub fn repeats(&self) -> bool {
        self.repeat_minutes > 0
    }
}

fn unknown_id() -> ReminderId {
    ReminderId(0)
}

fn fallback_text() -> String {
    FALLBACK_TEXT.to_string()
}

/// A visible notification for one reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub reminder_id: ReminderId,
    /// Channel the notification is posted to.
    pub channel_id: String,
    /// Each reminder is its own group of one, so repeated fires replace in place.
    pub group: String,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn for_payload(payload: &TimerPayload, channel_id: &str) -> Self {
        Self {
            reminder_id: payload.id,
            channel_id: channel_id.to_string(),
            group: group_for(payload.id),
            title: payload.title.clone(),
            body: payload.text.clone(),
        }
    }
}

/// Notification group key: `petcare-reminder-{id}`.
pub fn group_for(id: ReminderId) -> String {
    format!("petcare-reminder-{id}")
}

/// Render a due time in the local timezone, or the fallback text.
pub fn due_text(due_at: Option<DateTime<Utc>>) -> String {
    due_text_in(due_at, &Local)
}

/// Same as [`due_text`] but for an explicit timezone.
pub fn due_text_in<Tz>(due_at: Option<DateTime<Utc>>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match due_at {
        Some(at) => at.with_timezone(tz).format(DUE_FORMAT).to_string(),
        None => fallback_text(),
    }
}

/// Human-readable repeat interval: `1h 30m`, `2h`, `45m`.
pub fn format_repeat(minutes: i64) -> String {
    let m = minutes.unsigned_abs();
    let (h, mm) = (m / 60, m % 60);
    match (h, mm) {
        (0, mm) => format!("{mm}m"),
        (h, 0) => format!("{h}h"),
        (h, mm) => format!("{h}h {mm}m"),
    }
}
