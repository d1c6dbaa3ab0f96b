//! Community ban list repository.

use super::{invalid_data, store_error};
use async_trait::async_trait;
use campus_gate_core::{BanRecordId, CommunityId, ExternalId, PlatformUserId};
use campus_gate_verification::{BanKey, BanRecord, BanState, BanStore, StoreError};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

const KEY_EXTERNAL: &str = "external";
const KEY_PLATFORM: &str = "platform";

fn key_columns(key: &BanKey) -> (&'static str, &str) {
    match key {
        BanKey::External(id) => (KEY_EXTERNAL, id.as_str()),
        BanKey::Platform(id) => (KEY_PLATFORM, id.as_str()),
    }
}

/// Row type for ban queries.
#[derive(FromRow)]
struct BanRow {
    id: String,
    community_id: String,
    key_kind: String,
    key_value: String,
    origin_user: String,
    reason: String,
    created_by: String,
    created_at: DateTime<Utc>,
    lifted_at: Option<DateTime<Utc>>,
    lifted_by: Option<String>,
}

impl BanRow {
    fn try_into_record(self) -> Result<BanRecord, sqlx::Error> {
        let id = BanRecordId::from_str(&self.id)
            .map_err(|e| invalid_data(format!("invalid ban id '{}': {}", self.id, e)))?;

        let key = match self.key_kind.as_str() {
            KEY_EXTERNAL => BanKey::External(ExternalId::new(self.key_value)),
            KEY_PLATFORM => BanKey::Platform(PlatformUserId::new(self.key_value)),
            other => {
                return Err(invalid_data(format!(
                    "ban {} has unknown key kind '{other}'",
                    self.id
                )));
            }
        };

        let state = match (self.lifted_at, self.lifted_by) {
            (None, _) => BanState::Active,
            (Some(at), Some(by)) => BanState::Lifted {
                at,
                by: PlatformUserId::new(by),
            },
            (Some(_), None) => {
                return Err(invalid_data(format!(
                    "ban {} is lifted without an actor",
                    self.id
                )));
            }
        };

        Ok(BanRecord {
            id,
            community_id: CommunityId::new(self.community_id),
            key,
            origin_user: PlatformUserId::new(self.origin_user),
            reason: self.reason,
            created_by: PlatformUserId::new(self.created_by),
            created_at: self.created_at,
            state,
        })
    }
}

/// Ban lists in PostgreSQL.
#[derive(Clone)]
pub struct PgBanStore {
    pool: PgPool,
}

impl PgBanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanStore for PgBanStore {
    async fn active(
        &self,
        community: &CommunityId,
        key: &BanKey,
    ) -> Result<Option<BanRecord>, StoreError> {
        let (kind, value) = key_columns(key);
        let row: Option<BanRow> = sqlx::query_as(
            r#"
            SELECT id, community_id, key_kind, key_value, origin_user, reason,
                   created_by, created_at, lifted_at, lifted_by
            FROM community_bans
            WHERE community_id = $1 AND key_kind = $2 AND key_value = $3 AND lifted_at IS NULL
            "#,
        )
        .bind(community.as_str())
        .bind(kind)
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(BanRow::try_into_record)
            .transpose()
            .map_err(store_error)
    }

    async fn list(&self, community: &CommunityId) -> Result<Vec<BanRecord>, StoreError> {
        let rows: Vec<BanRow> = sqlx::query_as(
            r#"
            SELECT id, community_id, key_kind, key_value, origin_user, reason,
                   created_by, created_at, lifted_at, lifted_by
            FROM community_bans
            WHERE community_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(community.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(BanRow::try_into_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)
    }

    async fn save(&self, record: &BanRecord) -> Result<(), StoreError> {
        let (kind, value) = key_columns(&record.key);
        let (lifted_at, lifted_by) = match &record.state {
            BanState::Active => (None, None),
            BanState::Lifted { at, by } => (Some(*at), Some(by.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO community_bans (id, community_id, key_kind, key_value, origin_user, reason,
                                        created_by, created_at, lifted_at, lifted_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
            SET reason = EXCLUDED.reason,
                lifted_at = EXCLUDED.lifted_at,
                lifted_by = EXCLUDED.lifted_by
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.community_id.as_str())
        .bind(kind)
        .bind(value)
        .bind(record.origin_user.as_str())
        .bind(&record.reason)
        .bind(record.created_by.as_str())
        .bind(record.created_at)
        .bind(lifted_at)
        .bind(lifted_by)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str) -> BanRow {
        BanRow {
            id: BanRecordId::new().to_string(),
            community_id: "g1".to_string(),
            key_kind: kind.to_string(),
            key_value: "X123".to_string(),
            origin_user: "a".to_string(),
            reason: "spam".to_string(),
            created_by: "admin".to_string(),
            created_at: Utc::now(),
            lifted_at: None,
            lifted_by: None,
        }
    }

    #[test]
    fn external_key_row() {
        let record = row(KEY_EXTERNAL).try_into_record().unwrap();
        assert_eq!(record.key, BanKey::External(ExternalId::new("X123")));
        assert!(record.is_active());
    }

    #[test]
    fn platform_key_row() {
        let record = row(KEY_PLATFORM).try_into_record().unwrap();
        assert_eq!(record.key, BanKey::Platform(PlatformUserId::new("X123")));
    }

    #[test]
    fn unknown_key_kind_is_rejected() {
        assert!(row("email").try_into_record().is_err());
    }

    #[test]
    fn lifted_row_keeps_audit_fields() {
        let lifted_at = Utc::now();
        let record = BanRow {
            lifted_at: Some(lifted_at),
            lifted_by: Some("mod".to_string()),
            ..row(KEY_EXTERNAL)
        }
        .try_into_record()
        .unwrap();

        assert!(!record.is_active());
        assert_eq!(
            record.state,
            BanState::Lifted {
                at: lifted_at,
                by: PlatformUserId::new("mod"),
            }
        );
    }

    #[test]
    fn key_columns_match_row_kinds() {
        let external = BanKey::External(ExternalId::new("X123"));
        let (kind, value) = key_columns(&external);
        assert_eq!((kind, value), (KEY_EXTERNAL, "X123"));
        let (kind, _) = key_columns(&BanKey::Platform(PlatformUserId::new("b")));
        assert_eq!(kind, KEY_PLATFORM);
    }
}
