use thiserror::Error;

use crate::{Actor, Permission};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("permission denied: role '{role}' lacks '{permission}'")]
    Forbidden { role: String, permission: String },
}

/// Authorize an actor for a permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, required: &Permission) -> Result<(), AuthzError> {
    let granted = actor
        .role
        .permissions()
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        tracing::warn!(
            user = %actor.username,
            role = %actor.role,
            permission = %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden {
            role: actor.role.to_string(),
            permission: required.to_string(),
        })
    }
}
