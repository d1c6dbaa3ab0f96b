//! Custom import overlay repository.

use super::store_error;
use async_trait::async_trait;
use campus_gate_verification::{CustomImportEntry, CustomImportOverlay, StoreError};
use sqlx::{FromRow, PgPool};
use tracing::info;

/// Row type for overlay lookups.
#[derive(FromRow)]
struct CustomImportRow {
    departments: Vec<String>,
    entrance_year: Option<i32>,
}

impl From<CustomImportRow> for CustomImportEntry {
    fn from(row: CustomImportRow) -> Self {
        Self {
            departments: row.departments,
            entrance_year: row.entrance_year,
        }
    }
}

/// The custom import overlay in PostgreSQL.
#[derive(Clone)]
pub struct PgCustomImportOverlay {
    pool: PgPool,
}

impl PgCustomImportOverlay {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replaces the whole overlay with `entries` in one transaction.
    ///
    /// Entries are keyed by hashed institutional id; a later entry for the
    /// same key replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; the previous overlay is kept.
    pub async fn replace_all(
        &self,
        entries: &[(String, CustomImportEntry)],
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query("DELETE FROM custom_imports")
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        for (hashed_id, entry) in entries {
            sqlx::query(
                r#"
                INSERT INTO custom_imports (hashed_id, departments, entrance_year, imported_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (hashed_id) DO UPDATE
                SET departments = EXCLUDED.departments,
                    entrance_year = EXCLUDED.entrance_year,
                    imported_at = EXCLUDED.imported_at
                "#,
            )
            .bind(hashed_id)
            .bind(&entry.departments)
            .bind(entry.entrance_year)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        info!(entries = entries.len(), "replaced custom import overlay");
        Ok(entries.len() as u64)
    }
}

#[async_trait]
impl CustomImportOverlay for PgCustomImportOverlay {
    async fn lookup(&self, hashed_key: &str) -> Result<Option<CustomImportEntry>, StoreError> {
        let row: Option<CustomImportRow> = sqlx::query_as(
            r#"
            SELECT departments, entrance_year
            FROM custom_imports
            WHERE hashed_id = $1
            "#,
        )
        .bind(hashed_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(CustomImportEntry::from))
    }
}
