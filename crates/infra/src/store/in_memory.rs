use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use bloodbank_auth::Actor;
use bloodbank_core::{BloodGroup, DonorId, Entity, FulfillmentId, RequestId};
use bloodbank_donors::{Donor, DonorProfile, DonorQuery};
use bloodbank_inventory::{StockEntry, StockKey};
use bloodbank_requests::{
    FulfillmentRecord, HospitalRequest, NewFulfillment, NewRequest, RequestQuery, RequestStatus,
};

use super::r#trait::{DonorDirectory, LedgerStore, LedgerTx, StoreError, UserDirectory};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    stock: BTreeMap<StockKey, StockEntry>,
    requests: BTreeMap<RequestId, HospitalRequest>,
    fulfillments: Vec<FulfillmentRecord>,
    /// Highest request id ever assigned; ids are never reused.
    last_request_id: i64,
}

/// In-memory transactional ledger.
///
/// Intended for tests/dev. A transaction owns the ledger lock until it ends and
/// works on a staged copy, so transactions are fully serialized and an
/// uncommitted transaction leaves no trace.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with a zero-unit whole blood entry for every blood group.
    pub fn seeded() -> Self {
        let now = Utc::now();
        let stock = BloodGroup::ALL
            .into_iter()
            .filter_map(|g| {
                let key = StockKey::whole_blood(g);
                StockEntry::new(key, 0, now).ok().map(|e| (key, e))
            })
            .collect();
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                stock,
                ..LedgerState::default()
            })),
        }
    }

    /// Create or overwrite a stock entry (fixture setup).
    pub async fn put_stock(&self, key: StockKey, units: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let entry = StockEntry::new(key, units, at).map_err(|e| StoreError::Constraint {
            operation: "put_stock",
            message: e.to_string(),
        })?;
        self.state.lock().await.stock.insert(key, entry);
        Ok(())
    }

    /// Insert a request under a caller-chosen id (fixture setup).
    pub async fn put_request(&self, request: HospitalRequest) {
        let mut state = self.state.lock().await;
        state.last_request_id = state.last_request_id.max(request.id().get());
        state.requests.insert(request.id(), request);
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTx { guard, staged })
    }
}

/// Open in-memory transaction; see [`InMemoryLedger`].
#[derive(Debug)]
pub struct InMemoryTx {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn load_request(&mut self, id: RequestId) -> Result<Option<HospitalRequest>, StoreError> {
        Ok(self.staged.requests.get(&id).cloned())
    }

    async fn list_requests(&mut self, query: &RequestQuery, limit: usize) -> Result<Vec<HospitalRequest>, StoreError> {
        let mut found: Vec<HospitalRequest> = self
            .staged
            .requests
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.request_date, b.id).cmp(&(a.request_date, a.id)));
        found.truncate(limit);
        Ok(found)
    }

    async fn insert_request(
        &mut self,
        request: NewRequest,
        request_date: NaiveDate,
    ) -> Result<HospitalRequest, StoreError> {
        self.staged.last_request_id += 1;
        let stored = request.into_request(RequestId::new(self.staged.last_request_id), request_date);
        self.staged.requests.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn set_status_if(
        &mut self,
        id: RequestId,
        expected: RequestStatus,
        next: RequestStatus,
    ) -> Result<bool, StoreError> {
        match self.staged.requests.get_mut(&id) {
            Some(req) if req.status == expected => {
                req.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load_stock(&mut self, key: StockKey) -> Result<Option<StockEntry>, StoreError> {
        Ok(self.staged.stock.get(&key).cloned())
    }

    async fn withdraw_stock(
        &mut self,
        key: StockKey,
        units: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        match self.staged.stock.get_mut(&key) {
            Some(entry) if entry.can_supply(units) => Ok(entry.withdraw(units, at).ok()),
            _ => Ok(None),
        }
    }

    async fn restock(&mut self, key: StockKey, units: i64, at: DateTime<Utc>) -> Result<Option<i64>, StoreError> {
        let Some(entry) = self.staged.stock.get_mut(&key) else {
            return Ok(None);
        };
        entry
            .restock(units, at)
            .map(Some)
            .map_err(|e| StoreError::OutOfRange {
                operation: "restock",
                message: e.to_string(),
            })
    }

    async fn append_fulfillment(&mut self, entry: NewFulfillment) -> Result<FulfillmentRecord, StoreError> {
        if !self.staged.requests.contains_key(&entry.request_id) {
            return Err(StoreError::Constraint {
                operation: "append_fulfillment",
                message: format!("request {} does not exist", entry.request_id),
            });
        }
        let id = FulfillmentId::new(self.staged.fulfillments.len() as i64 + 1);
        let record = entry.into_record(id);
        self.staged.fulfillments.push(record.clone());
        Ok(record)
    }

    async fn fulfillments_for(&mut self, id: RequestId) -> Result<Vec<FulfillmentRecord>, StoreError> {
        Ok(self
            .staged
            .fulfillments
            .iter()
            .filter(|r| r.request_id == id)
            .cloned()
            .collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DonorState {
    donors: BTreeMap<DonorId, Donor>,
    /// Highest donor id ever assigned; ids are never reused.
    last_id: i64,
}

/// In-memory donor directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDonorDirectory {
    inner: RwLock<DonorState>,
}

impl InMemoryDonorDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl DonorDirectory for InMemoryDonorDirectory {
    async fn insert(&self, profile: DonorProfile) -> Result<Donor, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        state.last_id += 1;
        let donor = profile.into_donor(DonorId::new(state.last_id));
        state.donors.insert(donor.id(), donor.clone());
        Ok(donor)
    }

    async fn update(&self, id: DonorId, profile: DonorProfile) -> Result<Option<Donor>, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        Ok(state.donors.get_mut(&id).map(|donor| {
            profile.apply_to(donor);
            donor.clone()
        }))
    }

    async fn delete(&self, id: DonorId) -> Result<bool, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        Ok(state.donors.remove(&id).is_some())
    }

    async fn search(&self, query: &DonorQuery, limit: usize) -> Result<Vec<Donor>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state
            .donors
            .values()
            .rev()
            .filter(|d| query.matches(d))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// In-memory user directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, Actor>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, actor: Actor) -> Self {
        if let Ok(mut users) = self.users.write() {
            users.insert(actor.username.clone(), actor);
        }
        self
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<Actor>, StoreError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.get(username.trim()).cloned())
    }
}
