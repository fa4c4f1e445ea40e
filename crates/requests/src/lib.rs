//! Hospital request domain module.
//!
//! Request lifecycle rules and the fulfillment audit record. Pure domain logic:
//! persistence and the transactional workflow live in `bloodbank-infra`.

pub mod fulfillment;
pub mod query;
pub mod request;
pub mod status;

pub use fulfillment::{FulfillmentRecord, NewFulfillment};
pub use query::{RequestQuery, SEARCH_LIMIT};
pub use request::{HospitalRequest, NewRequest, UNSPECIFIED_CITY};
pub use status::RequestStatus;
