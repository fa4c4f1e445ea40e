use core::str::FromStr;
use serde::{Deserialize, Serialize};

use bloodbank_core::{DomainError, DomainResult};

/// Request lifecycle.
///
/// `Pending -> Fulfilled` and `Pending -> Cancelled` are the only legal moves;
/// both targets are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::Fulfilled,
        RequestStatus::Cancelled,
    ];

    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Fulfilled => "Fulfilled",
            RequestStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Fulfilled)
                | (RequestStatus::Pending, RequestStatus::Cancelled)
        )
    }

    /// Validate a move to `next`, returning the new status.
    ///
    /// Must be called before any status mutation is issued to a store.
    pub fn transition(self, next: RequestStatus) -> DomainResult<RequestStatus> {
        if self.can_transition_to(next) {
            return Ok(next);
        }
        if self.is_terminal() {
            Err(DomainError::invalid_state(format!("request is already {self}")))
        } else {
            Err(DomainError::invalid_state(format!(
                "cannot move request from {self} to {next}"
            )))
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        RequestStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| DomainError::validation(format!("unknown request status '{trimmed}'")))
    }
}
