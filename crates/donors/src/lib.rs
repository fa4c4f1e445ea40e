//! Donor registry domain module.
//!
//! Donor records, input validation and the search filter shared by every
//! directory backend.

pub mod donor;

pub use donor::{Donor, DonorProfile, DonorQuery, Gender, DEFAULT_DATE_OF_BIRTH, SEARCH_LIMIT};
