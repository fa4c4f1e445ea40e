//! Integration tests for the transactional fulfillment workflow.
//!
//! Tests: Workflow → LedgerStore → LedgerTx (in-memory, and Postgres when
//! `DATABASE_URL` is set)
//!
//! Verifies:
//! - Approve/Reject on non-Pending requests fail without touching stock
//! - Stock is decremented exactly once per successful approval
//! - Concurrent approvals never oversell a stock entry
//! - A failure after the stock decrement rolls back every effect
//! - Pending requests can be listed to find ids to approve or reject

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};

    use bloodbank_auth::{Actor, Role};
    use bloodbank_core::{BloodGroup, ComponentType, RequestId, UserId};
    use bloodbank_inventory::{StockEntry, StockKey};
    use bloodbank_requests::{
        FulfillmentRecord, HospitalRequest, NewFulfillment, NewRequest, RequestQuery, RequestStatus,
    };

    use crate::errors::{ErrorKind, Outcome, WorkflowError};
    use crate::fulfillment::FulfillmentWorkflow;
    use crate::store::{InMemoryLedger, InMemoryTx, LedgerStore, LedgerTx, StoreError};

    fn staff1() -> Actor {
        Actor::new(UserId::new(2), "staff1", Role::STAFF)
    }

    fn key(group: BloodGroup) -> StockKey {
        StockKey::whole_blood(group)
    }

    fn pending(id: i64, group: BloodGroup, units: i64) -> HospitalRequest {
        HospitalRequest {
            id: RequestId::new(id),
            hospital_name: "St. Mary's".to_string(),
            city: "Springfield".to_string(),
            blood_group: group,
            component: ComponentType::WHOLE_BLOOD,
            units_requested: units,
            notes: String::new(),
            request_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            status: RequestStatus::Pending,
        }
    }

    async fn ledger_with(group: BloodGroup, units: i64, requests: Vec<HospitalRequest>) -> InMemoryLedger {
        let ledger = InMemoryLedger::seeded();
        ledger.put_stock(key(group), units, Utc::now()).await.unwrap();
        for r in requests {
            ledger.put_request(r).await;
        }
        ledger
    }

    async fn units<S: LedgerStore>(wf: &FulfillmentWorkflow<S>, group: BloodGroup) -> i64 {
        wf.stock(group).await.unwrap().map(|e| e.units_available()).unwrap_or(-1)
    }

    #[tokio::test]
    async fn approving_request_42_fulfils_it_from_stock() {
        let ledger = ledger_with(BloodGroup::OPos, 10, vec![pending(42, BloodGroup::OPos, 3)]).await;
        let wf = FulfillmentWorkflow::new(ledger);

        let approval = wf.approve(RequestId::new(42), &staff1()).await.unwrap();
        assert_eq!(approval.units_supplied, 3);
        assert_eq!(approval.remaining_units, 7);

        assert_eq!(units(&wf, BloodGroup::OPos).await, 7);
        assert_eq!(wf.request(RequestId::new(42)).await.unwrap().status, RequestStatus::Fulfilled);

        let records = wf.fulfillments(RequestId::new(42)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_id, RequestId::new(42));
        assert_eq!(records[0].units_supplied, 3);
        assert_eq!(records[0].fulfilled_by.username, "staff1");
        assert_eq!(records[0].fulfilled_date, Utc::now().date_naive());
        assert_eq!(records[0].id, approval.fulfillment_id);
    }

    #[tokio::test]
    async fn terminal_requests_reject_both_operations_without_stock_change() {
        let mut fulfilled = pending(1, BloodGroup::APos, 2);
        fulfilled.status = RequestStatus::Fulfilled;
        let mut cancelled = pending(2, BloodGroup::APos, 2);
        cancelled.status = RequestStatus::Cancelled;
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::APos, 10, vec![fulfilled, cancelled]).await);

        for (id, status) in [(1, "Fulfilled"), (2, "Cancelled")] {
            let id = RequestId::new(id);
            let err = wf.approve(id, &staff1()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidState);
            assert_eq!(err.to_string(), format!("request {id} is already {status}"));

            let err = wf.reject(id).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidState);
            assert!(err.to_string().contains(status));
        }

        assert_eq!(units(&wf, BloodGroup::APos).await, 10);
        assert!(wf.fulfillments(RequestId::new(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_everything_unchanged() {
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::BNeg, 4, vec![pending(5, BloodGroup::BNeg, 6)]).await);
        let before = wf.stock(BloodGroup::BNeg).await.unwrap().unwrap();

        let err = wf.approve(RequestId::new(5), &staff1()).await.unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InsufficientStock {
                blood_group: BloodGroup::BNeg,
                requested: 6,
                available: 4,
            }
        );

        assert_eq!(wf.stock(BloodGroup::BNeg).await.unwrap().unwrap(), before);
        assert_eq!(wf.request(RequestId::new(5)).await.unwrap().status, RequestStatus::Pending);
        assert!(wf.fulfillments(RequestId::new(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_stock_entry_reports_zero_available() {
        let ledger = InMemoryLedger::new();
        ledger.put_request(pending(8, BloodGroup::AbPos, 1)).await;
        let wf = FulfillmentWorkflow::new(ledger);

        let err = wf.approve(RequestId::new(8), &staff1()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InsufficientStock { available: 0, requested: 1, .. }));
    }

    #[tokio::test]
    async fn unknown_request_is_not_found_for_approve_and_reject() {
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::OPos, 10, vec![]).await);
        let missing = RequestId::new(999);

        let err = wf.approve(missing, &staff1()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = wf.reject(missing).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(units(&wf, BloodGroup::OPos).await, 10);
    }

    #[tokio::test]
    async fn successful_approval_decrements_exactly_once() {
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::ONeg, 20, vec![pending(3, BloodGroup::ONeg, 7)]).await);

        wf.approve(RequestId::new(3), &staff1()).await.unwrap();
        assert_eq!(units(&wf, BloodGroup::ONeg).await, 13);
        assert_eq!(wf.fulfillments(RequestId::new(3)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_approval_is_rejected_and_stock_reflects_first_only() {
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::OPos, 10, vec![pending(4, BloodGroup::OPos, 3)]).await);

        wf.approve(RequestId::new(4), &staff1()).await.unwrap();
        let err = wf.approve(RequestId::new(4), &staff1()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        assert_eq!(units(&wf, BloodGroup::OPos).await, 7);
        assert_eq!(wf.fulfillments(RequestId::new(4)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reject_cancels_pending_request_and_keeps_stock() {
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::APos, 10, vec![pending(6, BloodGroup::APos, 3)]).await);

        let outcome: Outcome = wf.reject(RequestId::new(6)).await.into();
        assert!(outcome.success);
        assert_eq!(outcome.message, "request 6 rejected");

        assert_eq!(wf.request(RequestId::new(6)).await.unwrap().status, RequestStatus::Cancelled);
        assert_eq!(units(&wf, BloodGroup::APos).await, 10);

        let err = wf.approve(RequestId::new(6), &staff1()).await.unwrap_err();
        assert_eq!(err.to_string(), "request 6 is already Cancelled");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_never_oversell() {
        let ledger = ledger_with(
            BloodGroup::BPos,
            10,
            vec![pending(10, BloodGroup::BPos, 8), pending(11, BloodGroup::BPos, 8)],
        )
        .await;
        let wf = Arc::new(FulfillmentWorkflow::new(ledger));

        let handles: Vec<_> = [10, 11]
            .into_iter()
            .map(|id| {
                let wf = wf.clone();
                tokio::spawn(async move { wf.approve(RequestId::new(id), &staff1()).await })
            })
            .collect();

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let shortages = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::InsufficientStock))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(shortages, 1);
        assert_eq!(units(&wf, BloodGroup::BPos).await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approve_and_reject_settle_on_one_outcome() {
        let wf = Arc::new(FulfillmentWorkflow::new(
            ledger_with(BloodGroup::AbNeg, 10, vec![pending(12, BloodGroup::AbNeg, 4)]).await,
        ));

        let approving = {
            let wf = wf.clone();
            tokio::spawn(async move { wf.approve(RequestId::new(12), &staff1()).await.is_ok() })
        };
        let rejecting = {
            let wf = wf.clone();
            tokio::spawn(async move { wf.reject(RequestId::new(12)).await.is_ok() })
        };
        let approved = approving.await.unwrap();
        let rejected = rejecting.await.unwrap();
        assert!(approved ^ rejected);

        let status = wf.request(RequestId::new(12)).await.unwrap().status;
        if approved {
            assert_eq!(status, RequestStatus::Fulfilled);
            assert_eq!(units(&wf, BloodGroup::AbNeg).await, 6);
        } else {
            assert_eq!(status, RequestStatus::Cancelled);
            assert_eq!(units(&wf, BloodGroup::AbNeg).await, 10);
        }
    }

    #[tokio::test]
    async fn add_stock_rejects_non_positive_units_and_keeps_entry() {
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::OPos, 10, vec![]).await);
        let before = wf.stock(BloodGroup::OPos).await.unwrap().unwrap();

        for bad in [0, -3] {
            let err = wf.add_stock("O+", bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(wf.stock(BloodGroup::OPos).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn add_stock_increments_and_refreshes_timestamp() {
        let ledger = InMemoryLedger::seeded();
        let stale: DateTime<Utc> = Utc::now() - chrono::Duration::days(3);
        ledger.put_stock(key(BloodGroup::OPos), 10, stale).await.unwrap();
        let wf = FulfillmentWorkflow::new(ledger);

        let restock = wf.add_stock(" o+ ", 5).await.unwrap();
        assert_eq!(restock.total, 15);

        let entry = wf.stock(BloodGroup::OPos).await.unwrap().unwrap();
        assert_eq!(entry.units_available(), 15);
        assert!(entry.last_updated() > stale);
    }

    #[tokio::test]
    async fn pending_listing_tracks_approvals_and_rejections() {
        let mut older = pending(1, BloodGroup::APos, 2);
        older.hospital_name = "Northside Clinic".to_string();
        older.request_date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let requests = vec![older, pending(2, BloodGroup::APos, 2), pending(3, BloodGroup::APos, 2)];
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::APos, 10, requests).await);

        let all = wf.requests(&RequestQuery::default()).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        wf.approve(RequestId::new(2), &staff1()).await.unwrap();
        wf.reject(RequestId::new(3)).await.unwrap();

        let pending_only = RequestQuery::parse(None, Some("pending")).unwrap();
        let left = wf.requests(&pending_only).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, RequestId::new(1));

        let by_city = RequestQuery::parse(Some("SPRINGFIELD"), Some("all")).unwrap();
        assert_eq!(wf.requests(&by_city).await.unwrap().len(), 2);
        let by_hospital = RequestQuery::parse(Some("northside"), None).unwrap();
        assert_eq!(wf.requests(&by_hospital).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_listing_is_capped() {
        let requests = (1..=(bloodbank_requests::SEARCH_LIMIT as i64 + 5))
            .map(|id| pending(id, BloodGroup::BPos, 1))
            .collect();
        let wf = FulfillmentWorkflow::new(ledger_with(BloodGroup::BPos, 0, requests).await);
        let found = wf.requests(&RequestQuery::default()).await.unwrap();
        assert_eq!(found.len(), bloodbank_requests::SEARCH_LIMIT);
        assert_eq!(found[0].id, RequestId::new(bloodbank_requests::SEARCH_LIMIT as i64 + 5));
    }

    // Ledger whose transactions fail when appending the fulfillment record,
    // i.e. after the stock decrement and the status change were staged.
    #[derive(Clone)]
    struct FailingAppendLedger(InMemoryLedger);

    struct FailingAppendTx(InMemoryTx);

    #[async_trait]
    impl LedgerStore for FailingAppendLedger {
        type Tx = FailingAppendTx;

        async fn begin(&self) -> Result<FailingAppendTx, StoreError> {
            Ok(FailingAppendTx(self.0.begin().await?))
        }
    }

    #[async_trait]
    impl LedgerTx for FailingAppendTx {
        async fn load_request(&mut self, id: RequestId) -> Result<Option<HospitalRequest>, StoreError> {
            self.0.load_request(id).await
        }

        async fn list_requests(
            &mut self,
            query: &RequestQuery,
            limit: usize,
        ) -> Result<Vec<HospitalRequest>, StoreError> {
            self.0.list_requests(query, limit).await
        }

        async fn insert_request(
            &mut self,
            request: NewRequest,
            request_date: NaiveDate,
        ) -> Result<HospitalRequest, StoreError> {
            self.0.insert_request(request, request_date).await
        }

        async fn set_status_if(
            &mut self,
            id: RequestId,
            expected: RequestStatus,
            next: RequestStatus,
        ) -> Result<bool, StoreError> {
            self.0.set_status_if(id, expected, next).await
        }

        async fn load_stock(&mut self, key: StockKey) -> Result<Option<StockEntry>, StoreError> {
            self.0.load_stock(key).await
        }

        async fn withdraw_stock(
            &mut self,
            key: StockKey,
            units: i64,
            at: DateTime<Utc>,
        ) -> Result<Option<i64>, StoreError> {
            self.0.withdraw_stock(key, units, at).await
        }

        async fn restock(&mut self, key: StockKey, units: i64, at: DateTime<Utc>) -> Result<Option<i64>, StoreError> {
            self.0.restock(key, units, at).await
        }

        async fn append_fulfillment(&mut self, _entry: NewFulfillment) -> Result<FulfillmentRecord, StoreError> {
            Err(StoreError::Unavailable("connection reset".to_string()))
        }

        async fn fulfillments_for(&mut self, id: RequestId) -> Result<Vec<FulfillmentRecord>, StoreError> {
            self.0.fulfillments_for(id).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.0.commit().await
        }

        async fn rollback(self) -> Result<(), StoreError> {
            self.0.rollback().await
        }
    }

    #[tokio::test]
    async fn storage_failure_mid_approval_rolls_back_all_effects() {
        let ledger = ledger_with(BloodGroup::OPos, 10, vec![pending(42, BloodGroup::OPos, 3)]).await;
        let failing = FulfillmentWorkflow::new(FailingAppendLedger(ledger.clone()));

        let err = failing.approve(RequestId::new(42), &staff1()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);

        let wf = FulfillmentWorkflow::new(ledger);
        assert_eq!(units(&wf, BloodGroup::OPos).await, 10);
        assert_eq!(wf.request(RequestId::new(42)).await.unwrap().status, RequestStatus::Pending);
        assert!(wf.fulfillments(RequestId::new(42)).await.unwrap().is_empty());

        // The request is still approvable once storage recovers.
        assert_eq!(wf.approve(RequestId::new(42), &staff1()).await.unwrap().remaining_units, 7);
    }

    mod postgres {
        use super::*;
        use crate::config::StoreConfig;
        use crate::store::{schema, PostgresLedger};

        async fn workflow() -> Option<FulfillmentWorkflow<PostgresLedger>> {
            let Ok(config) = StoreConfig::from_env() else {
                return None;
            };
            let pool = config.connect().await.unwrap();
            schema::migrate(&pool).await.unwrap();
            Some(FulfillmentWorkflow::new(PostgresLedger::new(pool)))
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn postgres_workflow_end_to_end() {
            let Some(wf) = workflow().await else {
                return;
            };
            let wf = Arc::new(wf);
            let group = BloodGroup::ONeg;

            let start = wf.add_stock("O-", 10).await.unwrap().total;
            let overflow = wf.add_stock("O-", i64::MAX).await.unwrap_err();
            assert_eq!(overflow.kind(), ErrorKind::InvalidInput);
            assert_eq!(units(&wf, group).await, start);

            let first = wf
                .submit_request(NewRequest::new("Postgres General", group, 8))
                .await
                .unwrap();
            let second = wf
                .submit_request(NewRequest::new("Postgres General", group, start + 3))
                .await
                .unwrap();
            assert_eq!(first.status, RequestStatus::Pending);

            // Racing the same request: only one approval may win.
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let wf = wf.clone();
                    let id = first.id;
                    tokio::spawn(async move { wf.approve(id, &staff1()).await })
                })
                .collect();
            let mut wins = 0;
            for h in handles {
                match h.await.unwrap() {
                    Ok(_) => wins += 1,
                    // The loser either sees the new status or, if it blocked on
                    // the stock row first, finds too few units left.
                    Err(e) => assert!(matches!(
                        e.kind(),
                        ErrorKind::InvalidState | ErrorKind::InsufficientStock
                    )),
                }
            }
            assert_eq!(wins, 1);
            assert_eq!(units(&wf, group).await, start - 8);
            assert_eq!(wf.fulfillments(first.id).await.unwrap().len(), 1);

            let err = wf.approve(second.id, &staff1()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InsufficientStock);
            assert_eq!(units(&wf, group).await, start - 8);

            let mine = RequestQuery::parse(Some("postgres general"), Some("pending")).unwrap();
            let listed = wf.requests(&mine).await.unwrap();
            assert!(listed.iter().any(|r| r.id == second.id));
            assert!(listed.iter().all(|r| r.id != first.id));

            wf.reject(second.id).await.unwrap();
            assert_eq!(wf.reject(second.id).await.unwrap_err().kind(), ErrorKind::InvalidState);
            assert_eq!(wf.reject(RequestId::new(i64::MAX)).await.unwrap_err().kind(), ErrorKind::NotFound);
        }
    }
}
