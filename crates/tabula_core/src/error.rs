use thiserror::Error;

#[derive(Debug, Error)]
pub enum TabulaError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("policy violation: {message}")]
    Policy { message: String },
}

impl TabulaError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type TabulaResult<T> = Result<T, TabulaError>;

impl From<sea_orm::DbErr> for TabulaError {
    fn from(value: sea_orm::DbErr) -> Self {
        // Unique-index races surface here rather than in the pre-write checks.
        if let Some(sea_orm::SqlErr::UniqueConstraintViolation(message)) = value.sql_err() {
            return TabulaError::conflict(message);
        }
        TabulaError::storage(value.to_string())
    }
}

impl From<serde_json::Error> for TabulaError {
    fn from(value: serde_json::Error) -> Self {
        TabulaError::storage(format!("json: {value}"))
    }
}
