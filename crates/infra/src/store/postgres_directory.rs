use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use bloodbank_auth::{Actor, Role};
use bloodbank_core::{DonorId, UserId};
use bloodbank_donors::{Donor, DonorProfile, DonorQuery};

use super::postgres::map_sqlx_error;
use super::r#trait::{DonorDirectory, StoreError, UserDirectory};

const DONOR_COLUMNS: &str = "donor_id, name, blood_group, contact_number, email, city, \
                             date_of_birth, gender, last_donation_date";

/// Donor table access.
#[derive(Debug, Clone)]
pub struct PostgresDonorDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDonorDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn donor_from_row(operation: &'static str, row: &PgRow) -> Result<Donor, StoreError> {
    let get = |e: sqlx::Error| StoreError::corrupt(operation, e.to_string());
    let parse = |e: bloodbank_core::DomainError| StoreError::corrupt(operation, e.to_string());
    Ok(Donor {
        id: DonorId::new(row.try_get("donor_id").map_err(get)?),
        name: row.try_get("name").map_err(get)?,
        blood_group: row.try_get::<String, _>("blood_group").map_err(get)?.parse().map_err(parse)?,
        phone: row.try_get("contact_number").map_err(get)?,
        email: row.try_get("email").map_err(get)?,
        city: row.try_get("city").map_err(get)?,
        date_of_birth: row.try_get("date_of_birth").map_err(get)?,
        gender: row.try_get::<String, _>("gender").map_err(get)?.parse().map_err(parse)?,
        last_donation: row.try_get("last_donation_date").map_err(get)?,
    })
}

#[async_trait]
impl DonorDirectory for PostgresDonorDirectory {
    #[instrument(skip(self, profile), fields(blood_group = %profile.blood_group), err)]
    async fn insert(&self, profile: DonorProfile) -> Result<Donor, StoreError> {
        let date_of_birth = profile.date_of_birth_or_default();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO donors (
                name, blood_group, contact_number, email, city, date_of_birth, gender
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {DONOR_COLUMNS}
            "#
        ))
        .bind(profile.name.trim())
        .bind(profile.blood_group.as_str())
        .bind(profile.phone.trim())
        .bind(profile.email.trim())
        .bind(profile.city.trim())
        .bind(date_of_birth)
        .bind(profile.gender.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_donor", e))?;

        donor_from_row("insert_donor", &row)
    }

    #[instrument(skip(self, profile), fields(donor_id = %id), err)]
    async fn update(&self, id: DonorId, profile: DonorProfile) -> Result<Option<Donor>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE donors
            SET name = $2, blood_group = $3, contact_number = $4, email = $5, city = $6
            WHERE donor_id = $1
            RETURNING {DONOR_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(profile.name.trim())
        .bind(profile.blood_group.as_str())
        .bind(profile.phone.trim())
        .bind(profile.email.trim())
        .bind(profile.city.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_donor", e))?;

        row.map(|r| donor_from_row("update_donor", &r)).transpose()
    }

    #[instrument(skip(self), fields(donor_id = %id), err)]
    async fn delete(&self, id: DonorId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM donors WHERE donor_id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_donor", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn search(&self, query: &DonorQuery, limit: usize) -> Result<Vec<Donor>, StoreError> {
        // NULL parameters disable their filter.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DONOR_COLUMNS}
            FROM donors
            WHERE ($1::text IS NULL
                   OR LOWER(name) LIKE $1
                   OR LOWER(email) LIKE $1
                   OR LOWER(contact_number) LIKE $1)
              AND ($2::text IS NULL OR blood_group = $2)
            ORDER BY donor_id DESC
            LIMIT $3
            "#
        ))
        .bind(query.like_pattern())
        .bind(query.blood_group.map(|g| g.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_donors", e))?;

        rows.iter().map(|r| donor_from_row("search_donors", r)).collect()
    }
}

/// Users table lookup.
#[derive(Debug, Clone)]
pub struct PostgresUserDirectory {
    pool: Arc<PgPool>,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create or update a user's role. Used by operator tooling to seed accounts.
    #[instrument(skip(self), err)]
    pub async fn upsert(&self, username: &str, role: &Role) -> Result<Actor, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, role)
            VALUES ($1, $2)
            ON CONFLICT (username) DO UPDATE SET role = EXCLUDED.role
            RETURNING user_id, username, role
            "#,
        )
        .bind(username.trim())
        .bind(role.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_user", e))?;
        actor_from_row(&row)
    }
}

fn actor_from_row(row: &PgRow) -> Result<Actor, StoreError> {
    let get = |e: sqlx::Error| StoreError::corrupt("load_user", e.to_string());
    let user_id: i64 = row.try_get("user_id").map_err(get)?;
    let username: String = row.try_get("username").map_err(get)?;
    let role: String = row.try_get("role").map_err(get)?;
    Ok(Actor::new(UserId::new(user_id), username, Role::new(role)))
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    #[instrument(skip(self), err)]
    async fn find_by_username(&self, username: &str) -> Result<Option<Actor>, StoreError> {
        let row = sqlx::query("SELECT user_id, username, role FROM users WHERE username = $1")
            .bind(username.trim())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;
        row.map(|r| actor_from_row(&r)).transpose()
    }
}
