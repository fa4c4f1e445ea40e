use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use bloodbank_auth::Actor;
use bloodbank_core::{DonorId, RequestId};
use bloodbank_donors::{Donor, DonorProfile, DonorQuery};
use bloodbank_inventory::{StockEntry, StockKey};
use bloodbank_requests::{
    FulfillmentRecord, HospitalRequest, NewFulfillment, NewRequest, RequestQuery, RequestStatus,
};

/// Persistence failure.
///
/// These are **infrastructure errors** (connectivity, constraints, undecodable
/// rows) as opposed to domain errors (validation, lifecycle state).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    #[error("constraint violated in {operation}: {message}")]
    Constraint {
        operation: &'static str,
        message: String,
    },

    /// A value would leave its column's range (e.g. a stock total overflowing).
    #[error("value out of range in {operation}: {message}")]
    OutOfRange {
        operation: &'static str,
        message: String,
    },

    #[error("corrupt row in {operation}: {message}")]
    Corrupt {
        operation: &'static str,
        message: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn corrupt(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            operation,
            message: message.into(),
        }
    }
}

/// Transactional stock + request ledger.
///
/// Every workflow call opens exactly one transaction with [`LedgerStore::begin`]
/// and ends it with [`LedgerTx::commit`] or [`LedgerTx::rollback`]. Dropping a
/// transaction without committing must discard all of its effects.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}

/// One open ledger transaction.
///
/// Mutations are single conditional statements: implementations must never
/// split a check and its write across two round trips.
#[async_trait]
pub trait LedgerTx: Send {
    async fn load_request(&mut self, id: RequestId) -> Result<Option<HospitalRequest>, StoreError>;

    /// Matching requests, newest request date first (ties by id), at most `limit` rows.
    async fn list_requests(&mut self, query: &RequestQuery, limit: usize) -> Result<Vec<HospitalRequest>, StoreError>;

    /// Insert a Pending request dated `request_date`; the store assigns the id.
    async fn insert_request(
        &mut self,
        request: NewRequest,
        request_date: NaiveDate,
    ) -> Result<HospitalRequest, StoreError>;

    /// Set `status = next` only where the row is still `expected`.
    ///
    /// Returns `false` when no row matched (absent, or already moved on).
    async fn set_status_if(
        &mut self,
        id: RequestId,
        expected: RequestStatus,
        next: RequestStatus,
    ) -> Result<bool, StoreError>;

    async fn load_stock(&mut self, key: StockKey) -> Result<Option<StockEntry>, StoreError>;

    /// Decrement by `units` only if at least `units` are available.
    ///
    /// Returns the remaining total, or `None` when the entry is missing or short.
    async fn withdraw_stock(
        &mut self,
        key: StockKey,
        units: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError>;

    /// Increment an existing entry. Returns the new total, or `None` when there
    /// is no entry for `key`. A total that would overflow is
    /// [`StoreError::OutOfRange`].
    async fn restock(&mut self, key: StockKey, units: i64, at: DateTime<Utc>) -> Result<Option<i64>, StoreError>;

    async fn append_fulfillment(&mut self, entry: NewFulfillment) -> Result<FulfillmentRecord, StoreError>;

    async fn fulfillments_for(&mut self, id: RequestId) -> Result<Vec<FulfillmentRecord>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Donor registry storage.
#[async_trait]
pub trait DonorDirectory: Send + Sync {
    async fn insert(&self, profile: DonorProfile) -> Result<Donor, StoreError>;

    /// Returns the updated donor, or `None` if `id` is unknown.
    async fn update(&self, id: DonorId, profile: DonorProfile) -> Result<Option<Donor>, StoreError>;

    /// Returns `false` if `id` is unknown.
    async fn delete(&self, id: DonorId) -> Result<bool, StoreError>;

    /// Matching donors, newest id first, at most `limit` rows.
    async fn search(&self, query: &DonorQuery, limit: usize) -> Result<Vec<Donor>, StoreError>;
}

#[async_trait]
impl<D> DonorDirectory for Arc<D>
where
    D: DonorDirectory + ?Sized,
{
    async fn insert(&self, profile: DonorProfile) -> Result<Donor, StoreError> {
        (**self).insert(profile).await
    }

    async fn update(&self, id: DonorId, profile: DonorProfile) -> Result<Option<Donor>, StoreError> {
        (**self).update(id, profile).await
    }

    async fn delete(&self, id: DonorId) -> Result<bool, StoreError> {
        (**self).delete(id).await
    }

    async fn search(&self, query: &DonorQuery, limit: usize) -> Result<Vec<Donor>, StoreError> {
        (**self).search(query, limit).await
    }
}

/// Username -> actor lookup. Holds no credentials.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Actor>, StoreError>;
}
