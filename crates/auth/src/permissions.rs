use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "requests.fulfill").
/// The wildcard permission `"*"` grants everything and is held by admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
    /// Approve or reject hospital requests.
    pub const FULFILL_REQUESTS: Permission = Permission(Cow::Borrowed("requests.fulfill"));
    /// File a new hospital request.
    pub const SUBMIT_REQUESTS: Permission = Permission(Cow::Borrowed("requests.submit"));
    /// Add units to the stock ledger.
    pub const RESTOCK_INVENTORY: Permission = Permission(Cow::Borrowed("inventory.restock"));
    /// Create, update and delete donors.
    pub const MANAGE_DONORS: Permission = Permission(Cow::Borrowed("donors.manage"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
