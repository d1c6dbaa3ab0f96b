//! Pending verification request repository.

use super::store_error;
use async_trait::async_trait;
use campus_gate_core::{CommunityId, PlatformUserId};
use campus_gate_identity::{PendingStore, PendingVerification, VerificationToken};
use campus_gate_verification::StoreError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// Row type for verification request queries.
#[derive(FromRow)]
struct RequestRow {
    token: String,
    platform_user_id: String,
    community_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

impl From<RequestRow> for PendingVerification {
    fn from(row: RequestRow) -> Self {
        PendingVerification::with_all_fields(
            VerificationToken::from(row.token),
            PlatformUserId::new(row.platform_user_id),
            CommunityId::new(row.community_id),
            row.created_at,
            row.expires_at,
            row.consumed_at,
        )
    }
}

/// Verification requests in PostgreSQL.
#[derive(Clone)]
pub struct PgPendingStore {
    pool: PgPool,
}

impl PgPendingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingStore for PgPendingStore {
    async fn insert(&self, request: &PendingVerification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO verification_requests (token, platform_user_id, community_id,
                                               created_at, expires_at, consumed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(request.token().as_str())
        .bind(request.platform_user_id().as_str())
        .bind(request.community_id().as_str())
        .bind(request.created_at())
        .bind(request.expires_at())
        .bind(request.consumed_at())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn get(
        &self,
        token: &VerificationToken,
    ) -> Result<Option<PendingVerification>, StoreError> {
        let row: Option<RequestRow> = sqlx::query_as(
            r#"
            SELECT token, platform_user_id, community_id, created_at, expires_at, consumed_at
            FROM verification_requests
            WHERE token = $1
            "#,
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(PendingVerification::from))
    }

    async fn mark_consumed(
        &self,
        token: &VerificationToken,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE verification_requests
            SET consumed_at = $2
            WHERE token = $1 AND consumed_at IS NULL
            "#,
        )
        .bind(token.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM verification_requests WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn row_maps_to_request() {
        let now = Utc::now();
        let request = PendingVerification::from(RequestRow {
            token: "01J0000000000000000000TOKEN".to_string(),
            platform_user_id: "42".to_string(),
            community_id: "g1".to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
        });

        assert_eq!(request.token().as_str(), "01J0000000000000000000TOKEN");
        assert_eq!(request.platform_user_id().as_str(), "42");
        assert!(request.check(now).is_ok());
    }
}
