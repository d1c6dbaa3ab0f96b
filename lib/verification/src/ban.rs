//! Community bans that follow a person across linked accounts.
//!
//! A ban is recorded against the institutional identity key when the
//! banned account has one, so alt accounts sharing that key are caught
//! both when the ban is issued and whenever they are reconciled later.
//! Accounts that never verified are banned by platform id alone.

use crate::error::{BanError, StoreError};
use crate::identity::{IdentityRecord, IdentityStore};
use crate::platform::Platform;
use async_trait::async_trait;
use campus_gate_core::{BanRecordId, CommunityId, ExternalId, PlatformUserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What a ban record is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BanKey {
    External(ExternalId),
    Platform(PlatformUserId),
}

impl BanKey {
    /// Returns the key a ban on this account should be recorded under.
    #[must_use]
    pub fn for_account(user: &PlatformUserId, identity: Option<&IdentityRecord>) -> Self {
        match identity.and_then(IdentityRecord::external_id) {
            Some(external_id) => Self::External(external_id.clone()),
            None => Self::Platform(user.clone()),
        }
    }
}

impl fmt::Display for BanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External(id) => write!(f, "identity:{id}"),
            Self::Platform(id) => write!(f, "account:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BanState {
    Active,
    Lifted {
        #[serde(rename = "liftedAt")]
        at: DateTime<Utc>,
        #[serde(rename = "liftedBy")]
        by: PlatformUserId,
    },
}

/// An entry in a community's ban list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    pub id: BanRecordId,
    pub community_id: CommunityId,
    pub key: BanKey,
    /// The account the ban was issued against.
    pub origin_user: PlatformUserId,
    pub reason: String,
    pub created_by: PlatformUserId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: BanState,
}

impl BanRecord {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, BanState::Active)
    }
}

/// A community's persisted ban list.
#[async_trait]
pub trait BanStore: Send + Sync {
    /// Returns the active ban for a key, if any.
    async fn active(
        &self,
        community: &CommunityId,
        key: &BanKey,
    ) -> Result<Option<BanRecord>, StoreError>;

    /// Lists every record of a community, lifted ones included.
    async fn list(&self, community: &CommunityId) -> Result<Vec<BanRecord>, StoreError>;

    /// Inserts or replaces a record by id.
    async fn save(&self, record: &BanRecord) -> Result<(), StoreError>;
}

/// Finds the active ban covering an account.
///
/// The identity key is checked first, then the platform id, so an alt
/// that joins after its sibling was banned is still caught.
///
/// # Errors
///
/// Returns an error if the ban list cannot be read.
pub async fn find_active_ban(
    bans: &dyn BanStore,
    community: &CommunityId,
    user: &PlatformUserId,
    identity: Option<&IdentityRecord>,
) -> Result<Option<BanRecord>, StoreError> {
    if let Some(external_id) = identity.and_then(IdentityRecord::external_id) {
        let key = BanKey::External(external_id.clone());
        if let Some(record) = bans.active(community, &key).await? {
            return Ok(Some(record));
        }
    }
    bans.active(community, &BanKey::Platform(user.clone())).await
}

/// Accounts touched by a ban or unban.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanOutcome {
    pub key: BanKey,
    /// Accounts whose platform ban state was changed.
    pub affected: Vec<PlatformUserId>,
    /// Linked accounts whose platform call failed.
    pub failed: Vec<(PlatformUserId, String)>,
}

/// Issues and lifts bans across linked accounts.
#[derive(Clone)]
pub struct BanService {
    identities: Arc<dyn IdentityStore>,
    bans: Arc<dyn BanStore>,
    platform: Arc<dyn Platform>,
}

impl BanService {
    #[must_use]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        bans: Arc<dyn BanStore>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            identities,
            bans,
            platform,
        }
    }

    /// Returns the accounts linked to `user`, not including `user`.
    async fn linked_accounts(
        &self,
        user: &PlatformUserId,
        identity: Option<&IdentityRecord>,
    ) -> Result<Vec<PlatformUserId>, StoreError> {
        let Some(external_id) = identity.and_then(IdentityRecord::external_id) else {
            return Ok(Vec::new());
        };
        let mut linked: Vec<PlatformUserId> = self
            .identities
            .find_by_external_id(external_id)
            .await?
            .into_iter()
            .map(|record| record.platform_user_id().clone())
            .filter(|id| id != user)
            .collect();
        linked.sort();
        linked.dedup();
        Ok(linked)
    }

    /// Bans an account and every linked account that is a member.
    ///
    /// # Errors
    ///
    /// Returns [`BanError::PlatformUnavailable`] if the originating account
    /// cannot be banned. Failures on linked accounts are reported in the
    /// outcome instead.
    #[instrument(skip(self, reason))]
    pub async fn ban(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        reason: &str,
        actor: &PlatformUserId,
    ) -> Result<BanOutcome, BanError> {
        let identity = self.identities.get(user).await?;
        let key = BanKey::for_account(user, identity.as_ref());

        self.platform
            .ban(community, user, reason)
            .await
            .map_err(|e| BanError::PlatformUnavailable {
                reason: e.to_string(),
            })?;
        let mut outcome = BanOutcome {
            key: key.clone(),
            affected: vec![user.clone()],
            failed: Vec::new(),
        };

        let audit = format!("Linked to banned account {user} ({key}): {reason}");
        for alt in self.linked_accounts(user, identity.as_ref()).await? {
            let result = match self.platform.member(community, &alt).await {
                Ok(Some(_)) => self.platform.ban(community, &alt, &audit).await.map(|()| true),
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => outcome.affected.push(alt),
                Ok(false) => {}
                Err(e) => {
                    warn!(%alt, error = %e, "failed to ban linked account");
                    outcome.failed.push((alt, e.to_string()));
                }
            }
        }

        if self.bans.active(community, &key).await?.is_none() {
            let record = BanRecord {
                id: BanRecordId::new(),
                community_id: community.clone(),
                key: key.clone(),
                origin_user: user.clone(),
                reason: reason.to_string(),
                created_by: actor.clone(),
                created_at: Utc::now(),
                state: BanState::Active,
            };
            self.bans.save(&record).await?;
        }

        info!(%key, affected = outcome.affected.len(), "ban issued");
        Ok(outcome)
    }

    /// Lifts the ban on an account and every linked account.
    ///
    /// # Errors
    ///
    /// Returns [`BanError::NotBanned`] if neither the ban list nor the
    /// platform has a ban for any of the accounts.
    #[instrument(skip(self))]
    pub async fn unban(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        actor: &PlatformUserId,
    ) -> Result<BanOutcome, BanError> {
        let identity = self.identities.get(user).await?;
        let key = BanKey::for_account(user, identity.as_ref());
        let mut outcome = BanOutcome {
            key: key.clone(),
            affected: Vec::new(),
            failed: Vec::new(),
        };

        let mut records = Vec::new();
        for candidate in [key.clone(), BanKey::Platform(user.clone())] {
            if let Some(record) = self.bans.active(community, &candidate).await? {
                if !records.contains(&record) {
                    records.push(record);
                }
            }
        }

        let audit = format!("Ban lifted via {user} ({key})");
        let mut accounts = vec![user.clone()];
        accounts.extend(self.linked_accounts(user, identity.as_ref()).await?);
        for account in accounts {
            let result = match self.platform.is_banned(community, &account).await {
                Ok(true) => self.platform.unban(community, &account, &audit).await.map(|()| true),
                Ok(false) => Ok(false),
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => outcome.affected.push(account),
                Ok(false) => {}
                Err(e) if &account == user => {
                    return Err(BanError::PlatformUnavailable {
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(%account, error = %e, "failed to unban linked account");
                    outcome.failed.push((account, e.to_string()));
                }
            }
        }

        if records.is_empty() && outcome.affected.is_empty() {
            return Err(BanError::NotBanned { user: user.clone() });
        }

        let now = Utc::now();
        for mut record in records {
            record.state = BanState::Lifted {
                at: now,
                by: actor.clone(),
            };
            self.bans.save(&record).await?;
        }

        info!(%key, affected = outcome.affected.len(), "ban lifted");
        Ok(outcome)
    }

    /// Returns the active ban covering an account, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity store or ban list cannot be read.
    pub async fn active_ban(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
    ) -> Result<Option<BanRecord>, StoreError> {
        let identity = self.identities.get(user).await?;
        find_active_ban(self.bans.as_ref(), community, user, identity.as_ref()).await
    }

    /// Returns true if an active ban covers the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity store or ban list cannot be read.
    pub async fn is_banned(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
    ) -> Result<bool, StoreError> {
        Ok(self.active_ban(community, user).await?.is_some())
    }
}
