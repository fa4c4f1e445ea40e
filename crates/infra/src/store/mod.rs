//! Persistence seams for the ledger, donors and users.
//!
//! Each trait has an in-memory implementation (tests/dev) and a Postgres one.

pub mod in_memory;
pub mod postgres;
pub mod postgres_directory;
pub mod schema;
mod r#trait;

pub use in_memory::{InMemoryDonorDirectory, InMemoryLedger, InMemoryTx, InMemoryUserDirectory};
pub use postgres::{PostgresLedger, PostgresTx};
pub use postgres_directory::{PostgresDonorDirectory, PostgresUserDirectory};
pub use r#trait::{DonorDirectory, LedgerStore, LedgerTx, StoreError, UserDirectory};
