//! Caller-facing workflow errors.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bloodbank_core::{BloodGroup, DomainError, RequestId};
use bloodbank_requests::RequestStatus;

use crate::store::StoreError;

/// Failure of a workflow or registry operation.
///
/// Every variant maps onto exactly one [`ErrorKind`]. Any of them returned from
/// a ledger operation means the transaction was rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// The referenced request or donor does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The request is not in a state that allows the operation.
    #[error("{0}")]
    InvalidState(String),

    #[error("insufficient {blood_group} stock: requested {requested}, available {available}")]
    InsufficientStock {
        blood_group: BloodGroup,
        requested: i64,
        available: i64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Connectivity or constraint failure in the store.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl WorkflowError {
    pub fn request_not_found(id: RequestId) -> Self {
        Self::NotFound(format!("request {id}"))
    }

    pub fn request_already(id: RequestId, current: RequestStatus) -> Self {
        Self::InvalidState(format!("request {id} is already {current}"))
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::NotFound(_) => ErrorKind::NotFound,
            WorkflowError::InvalidState(_) => ErrorKind::InvalidState,
            WorkflowError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            WorkflowError::InvalidInput(_) => ErrorKind::InvalidInput,
            WorkflowError::Storage(_) => ErrorKind::StorageFailure,
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) | DomainError::InvariantViolation(msg) => {
                WorkflowError::InvalidInput(msg)
            }
            DomainError::InvalidState(msg) => WorkflowError::InvalidState(msg),
        }
    }
}

/// Stable classification of a [`WorkflowError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InsufficientStock,
    InvalidInput,
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::StorageFailure => "storage_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flattened result for callers that want a single message string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl<T: fmt::Display> From<Result<T, WorkflowError>> for Outcome {
    fn from(result: Result<T, WorkflowError>) -> Self {
        match result {
            Ok(value) => Outcome {
                success: true,
                kind: None,
                message: value.to_string(),
            },
            Err(err) => Outcome {
                success: false,
                kind: Some(err.kind()),
                message: err.to_string(),
            },
        }
    }
}
