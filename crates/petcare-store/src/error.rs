use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested row does not exist.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: i64 },

    /// The record failed validation before it reached the database.
    #[error("invalid record: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for petcare_core::PetcareError {
    fn from(e: StoreError) -> Self {
        use petcare_core::PetcareError;
        match e {
            StoreError::NotFound { what: "reminder", id } => PetcareError::ReminderNotFound { id },
            StoreError::NotFound { what: "pet", id } => PetcareError::PetNotFound {
                name: format!("#{id}"),
            },
            StoreError::NotFound { what, id } => {
                PetcareError::Database(format!("{what} not found: {id}"))
            }
            StoreError::Invalid(msg) => PetcareError::Invalid(msg),
            StoreError::Database(e) => PetcareError::Database(e.to_string()),
        }
    }
}
