use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A timer payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The durable-timer backend rejected the operation.
    #[error("Timer backend error: {0}")]
    Backend(String),

    /// A blocking backend task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<SchedulerError> for petcare_core::PetcareError {
    fn from(e: SchedulerError) -> Self {
        petcare_core::PetcareError::Scheduling(e.to_string())
    }
}
