use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier stored against each user.
///
/// Roles are opaque strings at this layer; [`Role::permissions`] is the single
/// place they are mapped to permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const STAFF: Role = Role(Cow::Borrowed("staff"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.as_str().eq_ignore_ascii_case("admin")
    }

    /// Permissions granted by this role.
    ///
    /// Admins hold the wildcard. Staff manage donors, stock and request
    /// fulfillment. Every other role may only submit requests.
    pub fn permissions(&self) -> Vec<Permission> {
        if self.is_admin() {
            return vec![Permission::WILDCARD];
        }
        if self.as_str().eq_ignore_ascii_case("staff") {
            return vec![
                Permission::SUBMIT_REQUESTS,
                Permission::FULFILL_REQUESTS,
                Permission::RESTOCK_INVENTORY,
                Permission::MANAGE_DONORS,
            ];
        }
        vec![Permission::SUBMIT_REQUESTS]
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
