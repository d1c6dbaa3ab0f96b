//! Community configuration repository.
//!
//! Configurations are stored as JSON documents so rule sets keep the
//! same field names everywhere they are persisted.

use super::store_error;
use async_trait::async_trait;
use campus_gate_core::CommunityId;
use campus_gate_verification::{CommunityConfig, ConfigSource, StoreError};
use sqlx::PgPool;

fn decode_config(value: serde_json::Value) -> Result<CommunityConfig, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        reason: format!("invalid community configuration: {e}"),
    })
}

/// Community configuration in PostgreSQL.
#[derive(Clone)]
pub struct PgConfigSource {
    pool: PgPool,
}

impl PgConfigSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigSource for PgConfigSource {
    async fn load(&self, community: &CommunityId) -> Result<Option<CommunityConfig>, StoreError> {
        let config: Option<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT config
            FROM community_configs
            WHERE community_id = $1
            "#,
        )
        .bind(community.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        config.map(decode_config).transpose()
    }

    async fn store(&self, config: &CommunityConfig) -> Result<(), StoreError> {
        let document = serde_json::to_value(config).map_err(|e| StoreError::Corrupt {
            reason: format!("failed to encode community configuration: {e}"),
        })?;

        sqlx::query(
            r#"
            INSERT INTO community_configs (community_id, config, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (community_id) DO UPDATE
            SET config = EXCLUDED.config, updated_at = NOW()
            "#,
        )
        .bind(config.community_id.as_str())
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_gate_verification::{DepartmentMatch, YearMatch};
    use serde_json::json;

    #[test]
    fn decodes_stored_rule_set() {
        let config = decode_config(json!({
            "communityId": "g1",
            "verificationEnabled": true,
            "ruleSet": {
                "rules": [{
                    "roles": [{ "id": "r1", "name": "Engineering" }],
                    "department": "VPA/",
                    "departmentMatchType": "begins",
                    "yearMatchType": "all"
                }]
            }
        }))
        .unwrap();

        let rules = config.active_rule_set().unwrap();
        assert_eq!(rules.rules[0].department_match_type, DepartmentMatch::Begins);
        assert_eq!(rules.rules[0].year_match_type, YearMatch::All);
    }

    #[test]
    fn unknown_match_type_is_corrupt() {
        let result = decode_config(json!({
            "communityId": "g1",
            "ruleSet": {
                "rules": [{
                    "roles": [{ "id": "r1", "name": "Engineering" }],
                    "department": "VPA/",
                    "departmentMatchType": "regex",
                    "yearMatchType": "all"
                }]
            }
        }));
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }
}
