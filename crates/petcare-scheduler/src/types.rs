use chrono::{DateTime, Utc};
use petcare_core::{ReminderId, TimerName, TimerPayload};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a durable timer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    /// Waiting for its fire_at time.
    Pending,
    /// Claimed by the engine; the fire handler is running.
    Firing,
}

impl std::fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimerStatus::Pending => "pending",
            TimerStatus::Firing => "firing",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TimerStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TimerStatus::Pending),
            "firing" => Ok(TimerStatus::Firing),
            other => Err(format!("unknown timer status: {other}")),
        }
    }
}

/// Everything needed to install one timer.
#[derive(Debug, Clone)]
pub struct TimerSpec {
    pub name: TimerName,
    pub reminder_id: ReminderId,
    pub fire_at: DateTime<Utc>,
    pub payload: TimerPayload,
    /// Scheme tag, used to purge timers from older schemes in bulk.
    pub tag: String,
}

/// A persisted timer row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRecord {
    pub name: TimerName,
    pub reminder_id: ReminderId,
    pub fire_at: DateTime<Utc>,
    /// Raw JSON; decoded leniently by the fire handler.
    pub payload: String,
    pub tag: String,
    pub status: TimerStatus,
    /// Bumped on every install and re-arm. Guards re-arm against a
    /// concurrent cancel or reschedule.
    pub generation: i64,
    /// Fire attempts since the last install or re-arm.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of the pure fire transition for one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireTransition {
    /// Repeating reminder: install the next tick at `fire_at`.
    Rearm { fire_at: DateTime<Utc> },
    /// One-shot reminder: the timer is consumed.
    Terminal,
}

/// What the fire handler reports back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Timer consumed or re-armed.
    Success,
    /// The backend could not record the transition; fire again later.
    Retry,
    /// The timer cannot be handled at all and should be dropped.
    Failure,
}

/// Per-tick summary returned by [`crate::TimerEngine::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fired: usize,
    pub retried: usize,
    pub dropped: usize,
    /// Fires whose follow-up backend call failed; their rows go back to `pending`.
    pub failed: usize,
}

/// Summary of a startup reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
}
