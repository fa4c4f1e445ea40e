//! Postgres-backed ledger.
//!
//! Every workflow call maps to one `sqlx::Transaction`. Mutations are single
//! conditional statements, so a check and its write can never be split by a
//! concurrent transaction even under read committed isolation.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Constraint` |
//! | Database (foreign key violation) | `23503` | `Constraint` |
//! | Database (check constraint violation) | `23514` | `Constraint` |
//! | Database (numeric out of range) | `22003` | `OutOfRange` |
//! | Database (other) | Any other | `Database` |
//! | PoolClosed / PoolTimedOut | N/A | `Unavailable` |
//! | Other | N/A | `Database` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use bloodbank_core::{FulfillmentId, RequestId};
use bloodbank_inventory::{StockEntry, StockKey};
use bloodbank_requests::{
    FulfillmentRecord, HospitalRequest, NewFulfillment, NewRequest, RequestQuery, RequestStatus,
};

use super::r#trait::{LedgerStore, LedgerTx, StoreError};

/// Postgres ledger over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: Arc<PgPool>,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx })
    }
}

/// Open Postgres transaction. Dropping it without [`LedgerTx::commit`] rolls back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresTx {
    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn load_request(&mut self, id: RequestId) -> Result<Option<HospitalRequest>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT request_id, hospital_name, city, blood_group, component_type,
                   units_requested, notes, request_date, status
            FROM hospital_requests
            WHERE request_id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_request", e))?;

        row.map(|r| RequestRow::from_row(&r).and_then(HospitalRequest::try_from))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_requests(&mut self, query: &RequestQuery, limit: usize) -> Result<Vec<HospitalRequest>, StoreError> {
        // NULL parameters disable their filter.
        let rows = sqlx::query(
            r#"
            SELECT request_id, hospital_name, city, blood_group, component_type,
                   units_requested, notes, request_date, status
            FROM hospital_requests
            WHERE ($1::text IS NULL
                   OR LOWER(hospital_name) LIKE $1
                   OR LOWER(city) LIKE $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY request_date DESC, request_id DESC
            LIMIT $3
            "#,
        )
        .bind(query.like_pattern())
        .bind(query.status.map(|s| s.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_requests", e))?;

        rows.iter()
            .map(|r| RequestRow::from_row(r).and_then(HospitalRequest::try_from))
            .collect()
    }

    #[instrument(skip(self, request), fields(blood_group = %request.blood_group, units = request.units_requested), err)]
    async fn insert_request(
        &mut self,
        request: NewRequest,
        request_date: NaiveDate,
    ) -> Result<HospitalRequest, StoreError> {
        let mut stored = request.into_request(RequestId::new(0), request_date);
        let row = sqlx::query(
            r#"
            INSERT INTO hospital_requests (
                hospital_name, city, blood_group, component_type,
                units_requested, notes, request_date, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING request_id
            "#,
        )
        .bind(&stored.hospital_name)
        .bind(&stored.city)
        .bind(stored.blood_group.as_str())
        .bind(stored.component.as_str())
        .bind(stored.units_requested)
        .bind(&stored.notes)
        .bind(stored.request_date)
        .bind(stored.status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;

        let id: i64 = row
            .try_get("request_id")
            .map_err(|e| StoreError::corrupt("insert_request", e.to_string()))?;
        stored.id = RequestId::new(id);
        Ok(stored)
    }

    #[instrument(skip(self), fields(request_id = %id, from = %expected, to = %next), err)]
    async fn set_status_if(
        &mut self,
        id: RequestId,
        expected: RequestStatus,
        next: RequestStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE hospital_requests
            SET status = $3
            WHERE request_id = $1 AND status = $2
            "#,
        )
        .bind(id.get())
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_status_if", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(stock = %key), err)]
    async fn load_stock(&mut self, key: StockKey) -> Result<Option<StockEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT units_available, last_updated
            FROM blood_stock
            WHERE blood_group = $1 AND component_type = $2
            "#,
        )
        .bind(key.blood_group.as_str())
        .bind(key.component.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_stock", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let units: i64 = row
            .try_get("units_available")
            .map_err(|e| StoreError::corrupt("load_stock", e.to_string()))?;
        let at: DateTime<Utc> = row
            .try_get("last_updated")
            .map_err(|e| StoreError::corrupt("load_stock", e.to_string()))?;
        StockEntry::new(key, units, at)
            .map(Some)
            .map_err(|e| StoreError::corrupt("load_stock", e.to_string()))
    }

    #[instrument(skip(self, at), fields(stock = %key), err)]
    async fn withdraw_stock(
        &mut self,
        key: StockKey,
        units: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE blood_stock
            SET units_available = units_available - $3,
                last_updated = $4
            WHERE blood_group = $1
              AND component_type = $2
              AND units_available >= $3
            RETURNING units_available
            "#,
        )
        .bind(key.blood_group.as_str())
        .bind(key.component.as_str())
        .bind(units)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("withdraw_stock", e))?;

        remaining_units("withdraw_stock", row)
    }

    #[instrument(skip(self, at), fields(stock = %key), err)]
    async fn restock(&mut self, key: StockKey, units: i64, at: DateTime<Utc>) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE blood_stock
            SET units_available = units_available + $3,
                last_updated = $4
            WHERE blood_group = $1 AND component_type = $2
            RETURNING units_available
            "#,
        )
        .bind(key.blood_group.as_str())
        .bind(key.component.as_str())
        .bind(units)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("restock", e))?;

        remaining_units("restock", row)
    }

    #[instrument(skip(self, entry), fields(request_id = %entry.request_id, units = entry.units_supplied), err)]
    async fn append_fulfillment(&mut self, entry: NewFulfillment) -> Result<FulfillmentRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO requests_fulfilled (
                request_id, units_supplied, fulfilled_date,
                fulfilled_by_user_id, fulfilled_by_username
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING fulfillment_id
            "#,
        )
        .bind(entry.request_id.get())
        .bind(entry.units_supplied)
        .bind(entry.fulfilled_date)
        .bind(entry.fulfilled_by.user_id.get())
        .bind(&entry.fulfilled_by.username)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_fulfillment", e))?;

        let id: i64 = row
            .try_get("fulfillment_id")
            .map_err(|e| StoreError::corrupt("append_fulfillment", e.to_string()))?;
        Ok(entry.into_record(FulfillmentId::new(id)))
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn fulfillments_for(&mut self, id: RequestId) -> Result<Vec<FulfillmentRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT fulfillment_id, request_id, units_supplied, fulfilled_date,
                   fulfilled_by_user_id, fulfilled_by_username
            FROM requests_fulfilled
            WHERE request_id = $1
            ORDER BY fulfillment_id ASC
            "#,
        )
        .bind(id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("fulfillments_for", e))?;

        rows.iter().map(fulfillment_from_row).collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn remaining_units(operation: &'static str, row: Option<sqlx::postgres::PgRow>) -> Result<Option<i64>, StoreError> {
    row.map(|r| {
        r.try_get::<i64, _>("units_available")
            .map_err(|e| StoreError::corrupt(operation, e.to_string()))
    })
    .transpose()
}

/// Map a sqlx error to a [`StoreError`], tagged with the failing operation.
pub(crate) fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                // unique, foreign key, check
                Some("23505") | Some("23503") | Some("23514") => StoreError::Constraint { operation, message },
                // numeric out of range
                Some("22003") => StoreError::OutOfRange { operation, message },
                _ => StoreError::Database { operation, message },
            }
        }
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => StoreError::Unavailable(format!("connection pool timed out in {operation}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::corrupt(operation, err.to_string())
        }
        other => StoreError::Database {
            operation,
            message: other.to_string(),
        },
    }
}

// SQLx row types

struct RequestRow {
    request_id: i64,
    hospital_name: String,
    city: String,
    blood_group: String,
    component_type: String,
    units_requested: i64,
    notes: String,
    request_date: NaiveDate,
    status: String,
}

impl RequestRow {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, StoreError> {
        let get = |e: sqlx::Error| StoreError::corrupt("load_request", e.to_string());
        Ok(Self {
            request_id: row.try_get("request_id").map_err(get)?,
            hospital_name: row.try_get("hospital_name").map_err(get)?,
            city: row.try_get("city").map_err(get)?,
            blood_group: row.try_get("blood_group").map_err(get)?,
            component_type: row.try_get("component_type").map_err(get)?,
            units_requested: row.try_get("units_requested").map_err(get)?,
            notes: row.try_get("notes").map_err(get)?,
            request_date: row.try_get("request_date").map_err(get)?,
            status: row.try_get("status").map_err(get)?,
        })
    }
}

impl TryFrom<RequestRow> for HospitalRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, StoreError> {
        let corrupt = |e: bloodbank_core::DomainError| StoreError::corrupt("load_request", e.to_string());
        Ok(HospitalRequest {
            id: RequestId::new(row.request_id),
            hospital_name: row.hospital_name,
            city: row.city,
            blood_group: row.blood_group.parse().map_err(corrupt)?,
            component: row.component_type.parse().map_err(corrupt)?,
            units_requested: row.units_requested,
            notes: row.notes,
            request_date: row.request_date,
            status: row.status.parse().map_err(corrupt)?,
        })
    }
}

fn fulfillment_from_row(row: &sqlx::postgres::PgRow) -> Result<FulfillmentRecord, StoreError> {
    let get = |e: sqlx::Error| StoreError::corrupt("fulfillments_for", e.to_string());
    Ok(FulfillmentRecord {
        id: FulfillmentId::new(row.try_get("fulfillment_id").map_err(get)?),
        request_id: RequestId::new(row.try_get("request_id").map_err(get)?),
        units_supplied: row.try_get("units_supplied").map_err(get)?,
        fulfilled_date: row.try_get("fulfilled_date").map_err(get)?,
        fulfilled_by: bloodbank_auth::ActorRef {
            user_id: bloodbank_core::UserId::new(row.try_get("fulfilled_by_user_id").map_err(get)?),
            username: row.try_get("fulfilled_by_username").map_err(get)?,
        },
    })
}
