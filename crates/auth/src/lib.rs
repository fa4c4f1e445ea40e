//! `bloodbank-auth`: caller-side authorization boundary.
//!
//! This crate is intentionally decoupled from transport and storage. It does not
//! authenticate anyone: callers resolve an [`Actor`] and ask [`authorize`] whether
//! that actor may perform a privileged operation.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, AuthzError};
pub use permissions::Permission;
pub use principal::{Actor, ActorRef};
pub use roles::Role;
