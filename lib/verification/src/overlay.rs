//! Custom import overlay.
//!
//! Communities can bulk-load extra attributes for people whose provider
//! data is wrong or incomplete. Entries are keyed by a one-way hash of
//! the institutional identity key so the raw key never has to be stored
//! with the import.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Hashes an institutional identity key into an overlay lookup key.
pub trait IdentityHasher: Send + Sync {
    fn hash(&self, external_id: &str) -> String;
}

/// Lowercase hex SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl IdentityHasher for Sha256Hasher {
    fn hash(&self, external_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(external_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Attributes imported for one person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomImportEntry {
    /// Additional candidate departments.
    #[serde(default)]
    pub departments: Vec<String>,
    /// Replaces the identity-derived entrance year when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrance_year: Option<i32>,
}

/// Lookup of imported attributes by hashed identity key.
#[async_trait]
pub trait CustomImportOverlay: Send + Sync {
    async fn lookup(&self, hashed_key: &str) -> Result<Option<CustomImportEntry>, StoreError>;
}

/// One row of a bulk import file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRow {
    id: String,
    #[serde(default)]
    departments: Vec<String>,
    #[serde(default)]
    entrance_year: Option<i32>,
}

/// Parses a JSON array of `{id, departments, entranceYear}` rows.
///
/// Raw ids are hashed with `hasher`; the returned pairs are keyed by hash
/// in file order.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] if the document is not a valid import.
pub fn parse_import(
    json: &str,
    hasher: &dyn IdentityHasher,
) -> Result<Vec<(String, CustomImportEntry)>, StoreError> {
    let rows: Vec<ImportRow> = serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
        reason: format!("invalid custom import: {e}"),
    })?;
    Ok(rows
        .into_iter()
        .map(|row| {
            (
                hasher.hash(&row.id),
                CustomImportEntry {
                    departments: row.departments,
                    entrance_year: row.entrance_year,
                },
            )
        })
        .collect())
}

/// An in-process overlay table.
#[derive(Debug, Default)]
pub struct CustomImportTable {
    entries: RwLock<HashMap<String, CustomImportEntry>>,
}

impl CustomImportTable {
    /// Loads an import document. Later rows replace earlier rows for the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the document is not a valid import.
    pub fn from_json(json: &str, hasher: &dyn IdentityHasher) -> Result<Self, StoreError> {
        let table = Self::default();
        for (key, entry) in parse_import(json, hasher)? {
            table.insert(key, entry);
        }
        Ok(table)
    }

    /// Inserts or replaces an entry under an already-hashed key.
    pub fn insert(&self, hashed_key: impl Into<String>, entry: CustomImportEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hashed_key.into(), entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CustomImportOverlay for CustomImportTable {
    async fn lookup(&self, hashed_key: &str) -> Result<Option<CustomImportEntry>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(hashed_key).cloned())
    }
}
