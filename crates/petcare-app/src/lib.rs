//! `petcare`: pet profiles and recurring care reminders.
//!
//! [`app::PetCare`] is the single service object of a process. It owns the
//! store and the reminder scheduler and is the only place where the two are
//! changed together.

pub mod app;

pub use app::PetCare;
