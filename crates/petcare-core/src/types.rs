use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every durable timer name owned by the reminder scheduler.
const TIMER_NAME_PREFIX: &str = "petcare-reminder-work-";

/// Store-assigned reminder identifier. The sole scheduling key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(pub i64);

impl ReminderId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReminderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Store-assigned pet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PetId(pub i64);

impl PetId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PetId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Unique name of a durable timer slot.
///
/// Derived deterministically from the reminder id, so scheduling the same
/// reminder twice always targets the same slot.
/// Format: `petcare-reminder-work-{id}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerName(pub String);

impl TimerName {
    pub fn for_reminder(id: ReminderId) -> Self {
        Self(format!("{TIMER_NAME_PREFIX}{id}"))
    }

    /// Recover the reminder id from a timer name, `None` for foreign names.
    pub fn reminder_id(&self) -> Option<ReminderId> {
        self.0
            .strip_prefix(TIMER_NAME_PREFIX)?
            .parse::<i64>()
            .ok()
            .map(ReminderId)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TimerName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Epoch milliseconds, the storage representation of every instant.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Inverse of [`to_millis`]. Out-of-range values clamp to the epoch.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_name_is_stable_per_reminder() {
        let a = TimerName::for_reminder(ReminderId(42));
        let b = TimerName::for_reminder(ReminderId(42));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "petcare-reminder-work-42");
    }

    #[test]
    fn timer_name_parses_back_to_reminder() {
        let name = TimerName::for_reminder(ReminderId(7));
        assert_eq!(name.reminder_id(), Some(ReminderId(7)));
    }

    #[test]
    fn foreign_timer_name_has_no_reminder() {
        assert_eq!(TimerName::from("catcare-reminder-work-x").reminder_id(), None);
        assert_eq!(TimerName::from("petcare-reminder-work-").reminder_id(), None);
    }
}
