//! Identity override repository.

use super::{invalid_data, store_error};
use async_trait::async_trait;
use campus_gate_core::{CommunityId, OverrideId, PlatformUserId};
use campus_gate_verification::{
    OverrideRecord, OverrideScope, OverrideState, OverrideStore, StoreError,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

const SCOPE_GLOBAL: &str = "GLOBAL";
const SCOPE_COMMUNITY: &str = "COMMUNITY";

/// Row type for override queries.
#[derive(FromRow)]
struct OverrideRow {
    id: String,
    target_user_id: String,
    scope: String,
    community_id: Option<String>,
    department: Option<String>,
    entrance_date: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
}

impl OverrideRow {
    fn try_into_record(self) -> Result<OverrideRecord, sqlx::Error> {
        let id = OverrideId::from_str(&self.id)
            .map_err(|e| invalid_data(format!("invalid override id '{}': {}", self.id, e)))?;

        let scope = match (self.scope.as_str(), self.community_id) {
            (SCOPE_GLOBAL, None) => OverrideScope::Global,
            (SCOPE_COMMUNITY, Some(community)) => {
                OverrideScope::Community(CommunityId::new(community))
            }
            (scope, community) => {
                return Err(invalid_data(format!(
                    "override {} has scope '{scope}' with community {community:?}",
                    self.id
                )));
            }
        };

        let state = match (self.deleted_at, self.deleted_by) {
            (None, _) => OverrideState::Active,
            (Some(at), Some(by)) => OverrideState::Deleted {
                at,
                by: PlatformUserId::new(by),
            },
            (Some(_), None) => {
                return Err(invalid_data(format!(
                    "override {} is deleted without an actor",
                    self.id
                )));
            }
        };

        Ok(OverrideRecord {
            id,
            target_user_id: PlatformUserId::new(self.target_user_id),
            scope,
            department: self.department,
            entrance_date: self.entrance_date,
            created_by: PlatformUserId::new(self.created_by),
            created_at: self.created_at,
            state,
        })
    }
}

fn scope_columns(scope: &OverrideScope) -> (&'static str, Option<&str>) {
    match scope {
        OverrideScope::Global => (SCOPE_GLOBAL, None),
        OverrideScope::Community(id) => (SCOPE_COMMUNITY, Some(id.as_str())),
    }
}

/// Overrides in PostgreSQL.
#[derive(Clone)]
pub struct PgOverrideStore {
    pool: PgPool,
}

impl PgOverrideStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OverrideStore for PgOverrideStore {
    async fn get(&self, id: &OverrideId) -> Result<Option<OverrideRecord>, StoreError> {
        let row: Option<OverrideRow> = sqlx::query_as(
            r#"
            SELECT id, target_user_id, scope, community_id, department, entrance_date,
                   created_by, created_at, deleted_at, deleted_by
            FROM identity_overrides
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(OverrideRow::try_into_record)
            .transpose()
            .map_err(store_error)
    }

    async fn active_for_user(
        &self,
        user: &PlatformUserId,
    ) -> Result<Vec<OverrideRecord>, StoreError> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"
            SELECT id, target_user_id, scope, community_id, department, entrance_date,
                   created_by, created_at, deleted_at, deleted_by
            FROM identity_overrides
            WHERE target_user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(OverrideRow::try_into_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)
    }

    async fn save(&self, record: &OverrideRecord) -> Result<(), StoreError> {
        let (scope, community_id) = scope_columns(&record.scope);
        let (deleted_at, deleted_by) = match &record.state {
            OverrideState::Active => (None, None),
            OverrideState::Deleted { at, by } => (Some(*at), Some(by.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO identity_overrides (id, target_user_id, scope, community_id, department,
                                            entrance_date, created_by, created_at, deleted_at, deleted_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
            SET department = EXCLUDED.department,
                entrance_date = EXCLUDED.entrance_date,
                deleted_at = EXCLUDED.deleted_at,
                deleted_by = EXCLUDED.deleted_by
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.target_user_id.as_str())
        .bind(scope)
        .bind(community_id)
        .bind(record.department.as_deref())
        .bind(record.entrance_date)
        .bind(record.created_by.as_str())
        .bind(record.created_at)
        .bind(deleted_at)
        .bind(deleted_by)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}
