//! Verified identity records.
//!
//! An identity record holds the attributes the institutional identity
//! provider vouched for: department, entrance date and the external
//! identity key that links several platform accounts to one person.
//! Records are written by the OAuth flow through [`upsert_identity`] and
//! are read-only to the rest of the engine.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use campus_gate_core::{ExternalId, PlatformUserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// A platform user's identity as reported by the identity provider.
///
/// The record is only usable for role matching once it is verified and
/// both the department and the entrance date are present. Partial
/// records exist while a verification is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Chat-platform account this record belongs to.
    platform_user_id: PlatformUserId,
    /// Institutional identity key; shared by alt accounts of one person.
    external_id: Option<ExternalId>,
    /// True once department and entrance date were both confirmed.
    verified: bool,
    department: Option<String>,
    /// Source of truth for the entrance year.
    entrance_date: Option<DateTime<Utc>>,
    /// Full name, used for nickname rewriting.
    display_name: Option<String>,
    /// Given name, used for first-name-only nicknames.
    given_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Creates an unverified record for a user whose verification is pending.
    #[must_use]
    pub fn pending(platform_user_id: PlatformUserId) -> Self {
        let now = Utc::now();
        Self {
            platform_user_id,
            external_id: None,
            verified: false,
            department: None,
            entrance_date: None,
            display_name: None,
            given_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a record with all fields specified.
    ///
    /// Use this when reconstituting a record from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        platform_user_id: PlatformUserId,
        external_id: Option<ExternalId>,
        verified: bool,
        department: Option<String>,
        entrance_date: Option<DateTime<Utc>>,
        display_name: Option<String>,
        given_name: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            platform_user_id,
            external_id,
            verified,
            department,
            entrance_date,
            display_name,
            given_name,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn platform_user_id(&self) -> &PlatformUserId {
        &self.platform_user_id
    }

    #[must_use]
    pub fn external_id(&self) -> Option<&ExternalId> {
        self.external_id.as_ref()
    }

    #[must_use]
    pub fn verified(&self) -> bool {
        self.verified
    }

    #[must_use]
    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    #[must_use]
    pub fn entrance_date(&self) -> Option<DateTime<Utc>> {
        self.entrance_date
    }

    /// Returns the calendar year of the entrance date.
    #[must_use]
    pub fn entrance_year(&self) -> Option<i32> {
        self.entrance_date.map(|date| date.year())
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the record can produce role matches on its own.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.verified && self.department.is_some() && self.entrance_date.is_some()
    }

    /// Overwrites the provider-sourced attributes with a fresh login result.
    ///
    /// `verified` is recomputed from the update: it is only set when the
    /// provider supplied both a department and an entrance date.
    pub fn apply(&mut self, update: IdentityUpdate) {
        self.verified = update.department.is_some() && update.entrance_date.is_some();
        self.external_id = update.external_id;
        self.department = update.department;
        self.entrance_date = update.entrance_date;
        self.display_name = update.display_name;
        self.given_name = update.given_name;
        self.updated_at = Utc::now();
    }
}

/// Attributes obtained from one successful institutional login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUpdate {
    pub external_id: Option<ExternalId>,
    pub department: Option<String>,
    pub entrance_date: Option<DateTime<Utc>>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
}

/// Storage for identity records.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Gets the record for a platform account.
    async fn get(&self, user: &PlatformUserId) -> Result<Option<IdentityRecord>, StoreError>;

    /// Finds every record that shares an institutional identity key.
    async fn find_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Vec<IdentityRecord>, StoreError>;

    /// Inserts or replaces the record for its platform account.
    async fn save(&self, record: &IdentityRecord) -> Result<(), StoreError>;
}

/// Creates or re-verifies the identity record of a platform account.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
#[instrument(skip(store, update))]
pub async fn upsert_identity(
    store: &dyn IdentityStore,
    platform_user_id: &PlatformUserId,
    update: IdentityUpdate,
) -> Result<IdentityRecord, StoreError> {
    let mut record = store
        .get(platform_user_id)
        .await?
        .unwrap_or_else(|| IdentityRecord::pending(platform_user_id.clone()));
    record.apply(update);
    store.save(&record).await?;
    debug!(verified = record.verified(), "identity record saved");
    Ok(record)
}
