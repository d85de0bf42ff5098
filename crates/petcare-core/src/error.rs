use thiserror::Error;

#[derive(Debug, Error)]
pub enum PetcareError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Pet not found: {name}")]
    PetNotFound { name: String },

    #[error("Reminder not found: {id}")]
    ReminderNotFound { id: i64 },

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PetcareError {
    /// Short error code string shown next to CLI error messages.
    pub fn code(&self) -> &'static str {
        match self {
            PetcareError::Config(_) => "CONFIG_ERROR",
            PetcareError::Database(_) => "DATABASE_ERROR",
            PetcareError::Scheduling(_) => "SCHEDULING_ERROR",
            PetcareError::PetNotFound { .. } => "PET_NOT_FOUND",
            PetcareError::ReminderNotFound { .. } => "REMINDER_NOT_FOUND",
            PetcareError::Invalid(_) => "INVALID_INPUT",
            PetcareError::Serialization(_) => "SERIALIZATION_ERROR",
            PetcareError::Io(_) => "IO_ERROR",
            PetcareError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PetcareError>;
