//! `bloodbank-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod blood;
pub mod entity;
pub mod error;
pub mod id;

pub use blood::{BloodGroup, ComponentType};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DonorId, FulfillmentId, RequestId, UserId};
