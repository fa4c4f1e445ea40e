//! Request fulfillment workflow.
//!
//! Approve, reject and restock run as exactly one ledger transaction each.
//! The workflow holds no locks of its own: isolation comes from the store's
//! transaction and its conditional updates. Every error path drops or rolls
//! back the transaction before returning, so a failed call leaves no partial
//! effects behind.

use core::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use bloodbank_auth::Actor;
use bloodbank_core::{BloodGroup, FulfillmentId, RequestId};
use bloodbank_inventory::{ensure_positive_units, StockEntry, StockKey};
use bloodbank_requests::{
    FulfillmentRecord, HospitalRequest, NewFulfillment, NewRequest, RequestQuery, RequestStatus, SEARCH_LIMIT,
};

use crate::errors::WorkflowError;
use crate::store::{LedgerStore, LedgerTx, StoreError};

/// Result of a successful approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub request_id: RequestId,
    pub blood_group: BloodGroup,
    pub units_supplied: i64,
    pub remaining_units: i64,
    pub fulfillment_id: FulfillmentId,
}

impl fmt::Display for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request {} approved: supplied {} units of {}, {} remaining",
            self.request_id, self.units_supplied, self.blood_group, self.remaining_units
        )
    }
}

/// Result of a successful rejection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub request_id: RequestId,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request {} rejected", self.request_id)
    }
}

/// Result of a successful restock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    pub blood_group: BloodGroup,
    pub units_added: i64,
    pub total: i64,
}

impl fmt::Display for Restock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added {} units of {}, {} now available",
            self.units_added, self.blood_group, self.total
        )
    }
}

/// Transactional approve / reject / restock over a [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct FulfillmentWorkflow<S> {
    store: S,
}

impl<S: LedgerStore> FulfillmentWorkflow<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fulfil a pending request from whole-blood stock.
    ///
    /// Stock decrement, status change and the fulfillment record commit together
    /// or not at all.
    #[instrument(skip(self, actor), fields(request_id = %request_id, actor = %actor.username))]
    pub async fn approve(&self, request_id: RequestId, actor: &Actor) -> Result<Approval, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let result = approve_in(&mut tx, request_id, actor).await;
        match result {
            Ok(approval) => {
                tx.commit().await?;
                info!(
                    blood_group = %approval.blood_group,
                    units = approval.units_supplied,
                    remaining = approval.remaining_units,
                    fulfillment_id = %approval.fulfillment_id,
                    "request approved"
                );
                Ok(approval)
            }
            Err(err) => Err(abort(tx, err).await),
        }
    }

    /// Cancel a pending request. Stock is untouched.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn reject(&self, request_id: RequestId) -> Result<Rejection, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let result = reject_in(&mut tx, request_id).await;
        match result {
            Ok(rejection) => {
                tx.commit().await?;
                info!("request rejected");
                Ok(rejection)
            }
            Err(err) => Err(abort(tx, err).await),
        }
    }

    /// Add whole-blood units for `blood_group`, returning the new total.
    ///
    /// The group must already have a stock entry; restocking never creates one.
    #[instrument(skip(self))]
    pub async fn add_stock(&self, blood_group: &str, units: i64) -> Result<Restock, WorkflowError> {
        let units = ensure_positive_units(units)?;
        let group: BloodGroup = blood_group.parse()?;

        let mut tx = self.store.begin().await?;
        let key = StockKey::whole_blood(group);
        let result = tx.restock(key, units, Utc::now()).await;
        match result {
            Ok(Some(total)) => {
                tx.commit().await?;
                info!(blood_group = %group, units, total, "stock added");
                Ok(Restock {
                    blood_group: group,
                    units_added: units,
                    total,
                })
            }
            Ok(None) => {
                let err = WorkflowError::invalid_input(format!("no stock entry for {key}"));
                Err(abort(tx, err).await)
            }
            Err(StoreError::OutOfRange { .. }) => {
                let err = WorkflowError::invalid_input(format!("adding {units} units would overflow {key}"));
                Err(abort(tx, err).await)
            }
            Err(err) => Err(abort(tx, err.into()).await),
        }
    }

    /// Record a new Pending request dated today.
    #[instrument(skip(self, request), fields(hospital = %request.hospital_name, blood_group = %request.blood_group))]
    pub async fn submit_request(&self, request: NewRequest) -> Result<HospitalRequest, WorkflowError> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let result = tx.insert_request(request, Utc::now().date_naive()).await;
        match result {
            Ok(stored) => {
                tx.commit().await?;
                info!(request_id = %stored.id, units = stored.units_requested, "request submitted");
                Ok(stored)
            }
            Err(err) => Err(abort(tx, err.into()).await),
        }
    }

    pub async fn request(&self, request_id: RequestId) -> Result<HospitalRequest, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let found = tx.load_request(request_id).await;
        tx.rollback().await?;
        found?.ok_or_else(|| WorkflowError::request_not_found(request_id))
    }

    /// Requests matching `query`, newest first, capped at [`SEARCH_LIMIT`].
    pub async fn requests(&self, query: &RequestQuery) -> Result<Vec<HospitalRequest>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let found = tx.list_requests(query, SEARCH_LIMIT).await;
        tx.rollback().await?;
        Ok(found?)
    }

    pub async fn stock(&self, blood_group: BloodGroup) -> Result<Option<StockEntry>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let entry = tx.load_stock(StockKey::whole_blood(blood_group)).await;
        tx.rollback().await?;
        Ok(entry?)
    }

    pub async fn fulfillments(&self, request_id: RequestId) -> Result<Vec<FulfillmentRecord>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let records = tx.fulfillments_for(request_id).await;
        tx.rollback().await?;
        Ok(records?)
    }
}

async fn approve_in<T: LedgerTx>(tx: &mut T, request_id: RequestId, actor: &Actor) -> Result<Approval, WorkflowError> {
    let request = tx
        .load_request(request_id)
        .await?
        .ok_or_else(|| WorkflowError::request_not_found(request_id))?;
    if !request.is_pending() {
        return Err(WorkflowError::request_already(request_id, request.status));
    }
    let next = request.status.transition(RequestStatus::Fulfilled)?;
    let units = ensure_positive_units(request.units_requested)?;

    let now = Utc::now();
    let key = StockKey::whole_blood(request.blood_group);
    let Some(remaining) = tx.withdraw_stock(key, units, now).await? else {
        let available = tx
            .load_stock(key)
            .await?
            .map(|entry| entry.units_available())
            .unwrap_or(0);
        return Err(WorkflowError::InsufficientStock {
            blood_group: request.blood_group,
            requested: units,
            available,
        });
    };

    if !tx.set_status_if(request_id, RequestStatus::Pending, next).await? {
        return Err(status_conflict(tx, request_id).await);
    }

    let entry = NewFulfillment {
        request_id,
        units_supplied: units,
        fulfilled_date: now.date_naive(),
        fulfilled_by: actor.to_ref(),
    };
    entry.validate()?;
    let record = tx.append_fulfillment(entry).await?;

    Ok(Approval {
        request_id,
        blood_group: request.blood_group,
        units_supplied: units,
        remaining_units: remaining,
        fulfillment_id: record.id,
    })
}

async fn reject_in<T: LedgerTx>(tx: &mut T, request_id: RequestId) -> Result<Rejection, WorkflowError> {
    let next = RequestStatus::Pending.transition(RequestStatus::Cancelled)?;
    if tx
        .set_status_if(request_id, RequestStatus::Pending, next)
        .await?
    {
        return Ok(Rejection { request_id });
    }
    Err(status_conflict(tx, request_id).await)
}

/// Explain why a Pending check-and-set matched no row.
///
/// The write already decided the outcome; this read only picks the message.
async fn status_conflict<T: LedgerTx>(tx: &mut T, request_id: RequestId) -> WorkflowError {
    match tx.load_request(request_id).await {
        Ok(Some(request)) => WorkflowError::request_already(request_id, request.status),
        Ok(None) => WorkflowError::request_not_found(request_id),
        Err(err) => err.into(),
    }
}

async fn abort<T: LedgerTx>(tx: T, err: WorkflowError) -> WorkflowError {
    if let Err(rollback_err) = tx.rollback().await {
        error!(error = %rollback_err, "rollback failed; transaction discarded on drop");
    }
    match &err {
        WorkflowError::Storage(store_err) => error!(error = %store_err, "storage failure"),
        other => warn!(kind = %other.kind(), reason = %other, "operation rejected"),
    }
    err
}
