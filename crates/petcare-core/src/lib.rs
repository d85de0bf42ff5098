//! `petcare-core`: types shared by the store, the scheduler and the app.

pub mod config;
pub mod error;
pub mod reminder;
pub mod types;

pub use error::{PetcareError, Result};
pub use reminder::{Notification, TimerPayload};
pub use types::{PetId, ReminderId, TimerName};
