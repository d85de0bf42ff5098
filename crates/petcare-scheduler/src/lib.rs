//! `petcare-scheduler`: reminder scheduling on top of durable SQLite timers.
//!
//! # Overview
//!
//! Each reminder owns at most one row in the `timers` table, named
//! `petcare-reminder-work-{id}`. [`ReminderScheduler`] installs, replaces and
//! cancels those rows; [`TimerEngine`] polls for due rows and runs the fire
//! handler, which posts a notification and re-arms repeating reminders.
//!
//! # Fire time
//!
//! | Reminder                         | Fires at                                  |
//! |----------------------------------|-------------------------------------------|
//! | no due time                      | now                                       |
//! | due time in the future           | the due time                              |
//! | overdue, repeating               | next `due + k * interval` at or after now |
//! | overdue, one-shot                | now                                       |
//! | after a repeating fire           | fire time + interval                      |

pub mod backend;
pub mod db;
pub mod engine;
pub mod error;
pub mod notify;
pub mod recurrence;
pub mod scheduler;
pub mod types;

pub use backend::{SqliteTimerBackend, TimerBackend};
pub use engine::TimerEngine;
pub use error::{Result, SchedulerError};
pub use notify::{ChannelSpec, NotificationCenter, NotificationEvent, Notifier, PermissionGate};
pub use recurrence::next_fire_time;
pub use scheduler::ReminderScheduler;
pub use types::{FireOutcome, FireTransition, ReconcileReport, TickReport, TimerRecord, TimerStatus};
