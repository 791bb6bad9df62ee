use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    OwnerProtected,
    InvalidIdFormat,
    DuplicateEntity,
    StoreFailure,
}

/// Failures of the share workflow. None of them are fatal; each one degrades to a
/// message the caller shows to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("{entity_id} owns this case and cannot be removed")]
    OwnerProtected { entity_id: String },
    #[error("'{input}' is not a valid id: expected 15 or 18 characters, got {length}")]
    InvalidIdFormat { input: String, length: usize },
    #[error("{entity_id} already has access to this case")]
    DuplicateEntity { entity_id: String },
    #[error("{operation} failed: {message}")]
    StoreFailure { operation: String, message: String },
}

impl ShareError {
    pub fn store_failure(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ShareError::OwnerProtected { .. } => ErrorCode::OwnerProtected,
            ShareError::InvalidIdFormat { .. } => ErrorCode::InvalidIdFormat,
            ShareError::DuplicateEntity { .. } => ErrorCode::DuplicateEntity,
            ShareError::StoreFailure { .. } => ErrorCode::StoreFailure,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ShareError::StoreFailure { operation, .. } => {
                format!("Unable to {operation}; please try again.")
            }
            other => other.to_string(),
        }
    }
}

/// Serializable form of a [`ShareError`] for event payloads and console output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ShareError> for ShareErrorReport {
    fn from(value: &ShareError) -> Self {
        Self {
            code: value.code(),
            message: value.user_message(),
        }
    }
}
