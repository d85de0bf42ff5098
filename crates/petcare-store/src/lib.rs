//! `petcare-store`: SQLite persistence for pets and their care reminders.
//!
//! The store is the source of truth for reminder records, including the
//! `completed` flag. It knows nothing about timers; callers keep scheduler
//! state and store state in step.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::PetStore;
pub use types::{NewPet, NewReminder, Pet, Reminder};
