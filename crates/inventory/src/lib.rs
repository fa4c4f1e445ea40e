//! Inventory domain module.
//!
//! Business rules for the blood stock ledger, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod stock;

pub use stock::{ensure_positive_units, StockEntry, StockKey};
