use serde::{Deserialize, Serialize};

use bloodbank_core::UserId;

use crate::Role;

/// An identified user acting on the system, as resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }

    /// Identity-only view recorded on audit entries.
    pub fn to_ref(&self) -> ActorRef {
        ActorRef {
            user_id: self.user_id,
            username: self.username.clone(),
        }
    }
}

/// Who performed an operation, without their role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub user_id: UserId,
    pub username: String,
}

impl core::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} (#{})", self.username, self.user_id)
    }
}
