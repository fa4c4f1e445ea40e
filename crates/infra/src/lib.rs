//! Infrastructure layer: stores, schema, config and the transactional workflows.

pub mod config;
pub mod donors;
pub mod errors;
pub mod fulfillment;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, StoreConfig};
pub use donors::DonorRegistry;
pub use errors::{ErrorKind, Outcome, WorkflowError};
pub use fulfillment::{Approval, FulfillmentWorkflow, Rejection, Restock};
