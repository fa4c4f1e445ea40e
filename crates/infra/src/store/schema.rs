//! Idempotent Postgres schema setup.

use sqlx::PgPool;
use tracing::{info, instrument};

use bloodbank_core::{BloodGroup, ComponentType};

use super::postgres::map_sqlx_error;
use super::r#trait::StoreError;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id     BIGSERIAL PRIMARY KEY,
        username    TEXT NOT NULL UNIQUE,
        role        TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS donors (
        donor_id            BIGSERIAL PRIMARY KEY,
        name                TEXT NOT NULL,
        blood_group         TEXT NOT NULL,
        contact_number      TEXT NOT NULL,
        email               TEXT NOT NULL DEFAULT '',
        city                TEXT NOT NULL DEFAULT '',
        date_of_birth       DATE NOT NULL,
        gender              TEXT NOT NULL DEFAULT 'Other',
        last_donation_date  DATE NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS blood_stock (
        blood_group      TEXT NOT NULL,
        component_type   TEXT NOT NULL,
        units_available  BIGINT NOT NULL CHECK (units_available >= 0),
        last_updated     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (blood_group, component_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hospital_requests (
        request_id       BIGSERIAL PRIMARY KEY,
        hospital_name    TEXT NOT NULL,
        city             TEXT NOT NULL DEFAULT '',
        blood_group      TEXT NOT NULL,
        component_type   TEXT NOT NULL,
        units_requested  BIGINT NOT NULL CHECK (units_requested > 0),
        notes            TEXT NOT NULL DEFAULT '',
        request_date     DATE NOT NULL,
        status           TEXT NOT NULL CHECK (status IN ('Pending', 'Fulfilled', 'Cancelled'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS requests_fulfilled (
        fulfillment_id         BIGSERIAL PRIMARY KEY,
        request_id             BIGINT NOT NULL REFERENCES hospital_requests (request_id),
        units_supplied         BIGINT NOT NULL CHECK (units_supplied > 0),
        fulfilled_date         DATE NOT NULL,
        fulfilled_by_user_id   BIGINT NOT NULL,
        fulfilled_by_username  TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS requests_fulfilled_request_idx ON requests_fulfilled (request_id)",
];

/// Create every table if missing and seed a zero whole-blood entry per group.
///
/// Safe to run repeatedly: existing rows and stock levels are left alone.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("migrate", e))?;

    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }

    let mut seeded = 0;
    for group in BloodGroup::ALL {
        let result = sqlx::query(
            r#"
            INSERT INTO blood_stock (blood_group, component_type, units_available)
            VALUES ($1, $2, 0)
            ON CONFLICT (blood_group, component_type) DO NOTHING
            "#,
        )
        .bind(group.as_str())
        .bind(ComponentType::WHOLE_BLOOD.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("seed_stock", e))?;
        seeded += result.rows_affected();
    }

    tx.commit().await.map_err(|e| map_sqlx_error("migrate", e))?;
    info!(seeded_stock_rows = seeded, "schema up to date");
    Ok(())
}
