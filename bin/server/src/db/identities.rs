//! Identity record repository.

use super::{invalid_data, store_error};
use async_trait::async_trait;
use campus_gate_core::{ExternalId, PlatformUserId};
use campus_gate_verification::{IdentityRecord, IdentityStore, StoreError};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// Row type for identity queries.
#[derive(FromRow)]
struct IdentityRow {
    platform_user_id: String,
    external_id: Option<String>,
    verified: bool,
    department: Option<String>,
    entrance_date: Option<DateTime<Utc>>,
    display_name: Option<String>,
    given_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn try_into_record(self) -> Result<IdentityRecord, sqlx::Error> {
        if self.platform_user_id.is_empty() {
            return Err(invalid_data("empty platform user id".to_string()));
        }
        Ok(IdentityRecord::with_all_fields(
            PlatformUserId::new(self.platform_user_id),
            self.external_id.map(ExternalId::new),
            self.verified,
            self.department,
            self.entrance_date,
            self.display_name,
            self.given_name,
            self.created_at,
            self.updated_at,
        ))
    }
}

/// Identity records in PostgreSQL.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn get(&self, user: &PlatformUserId) -> Result<Option<IdentityRecord>, StoreError> {
        let row: Option<IdentityRow> = sqlx::query_as(
            r#"
            SELECT platform_user_id, external_id, verified, department, entrance_date,
                   display_name, given_name, created_at, updated_at
            FROM identities
            WHERE platform_user_id = $1
            "#,
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(IdentityRow::try_into_record)
            .transpose()
            .map_err(store_error)
    }

    async fn find_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Vec<IdentityRecord>, StoreError> {
        let rows: Vec<IdentityRow> = sqlx::query_as(
            r#"
            SELECT platform_user_id, external_id, verified, department, entrance_date,
                   display_name, given_name, created_at, updated_at
            FROM identities
            WHERE external_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(external_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(IdentityRow::try_into_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)
    }

    async fn save(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO identities (platform_user_id, external_id, verified, department,
                                    entrance_date, display_name, given_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (platform_user_id) DO UPDATE
            SET external_id = EXCLUDED.external_id,
                verified = EXCLUDED.verified,
                department = EXCLUDED.department,
                entrance_date = EXCLUDED.entrance_date,
                display_name = EXCLUDED.display_name,
                given_name = EXCLUDED.given_name,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.platform_user_id().as_str())
        .bind(record.external_id().map(ExternalId::as_str))
        .bind(record.verified())
        .bind(record.department())
        .bind(record.entrance_date())
        .bind(record.display_name())
        .bind(record.given_name())
        .bind(record.created_at())
        .bind(record.updated_at())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}
