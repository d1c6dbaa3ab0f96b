//! Pending verification requests.
//!
//! The command layer creates a request when a member asks to verify and
//! sends them a link carrying the request's token. The OAuth callback
//! consumes the request and writes the identity record for the account
//! the link was issued to, so a login can never be attached to another
//! member's account.

use crate::error::AuthenticationError;
use async_trait::async_trait;
use campus_gate_core::{CommunityId, PlatformUserId};
use campus_gate_verification::{IdentityRecord, IdentityStore, IdentityUpdate, StoreError};
use chrono::{DateTime, Duration, Utc};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use ulid::Ulid;

/// Opaque token embedded in a verification link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationToken(String);

impl VerificationToken {
    /// Generates a fresh token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VerificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VerificationToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VerificationToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A verification link that has been issued to a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVerification {
    token: VerificationToken,
    platform_user_id: PlatformUserId,
    /// Community the member asked from; reconciled once verification completes.
    community_id: CommunityId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

impl PendingVerification {
    /// Creates a request valid for `ttl`.
    #[must_use]
    pub fn new(platform_user_id: PlatformUserId, community_id: CommunityId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token: VerificationToken::generate(),
            platform_user_id,
            community_id,
            created_at: now,
            expires_at: now + ttl,
            consumed_at: None,
        }
    }

    /// Creates a request with all fields specified.
    ///
    /// Use this when reconstituting a request from storage.
    #[must_use]
    pub fn with_all_fields(
        token: VerificationToken,
        platform_user_id: PlatformUserId,
        community_id: CommunityId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        consumed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token,
            platform_user_id,
            community_id,
            created_at,
            expires_at,
            consumed_at,
        }
    }

    #[must_use]
    pub fn token(&self) -> &VerificationToken {
        &self.token
    }

    #[must_use]
    pub fn platform_user_id(&self) -> &PlatformUserId {
        &self.platform_user_id
    }

    #[must_use]
    pub fn community_id(&self) -> &CommunityId {
        &self.community_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn consumed_at(&self) -> Option<DateTime<Utc>> {
        self.consumed_at
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Checks that the request can still be used at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RequestConsumed` or `RequestExpired`.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), AuthenticationError> {
        if self.consumed_at.is_some() {
            return Err(AuthenticationError::RequestConsumed {
                token: self.token.to_string(),
            });
        }
        if self.is_expired_at(now) {
            return Err(AuthenticationError::RequestExpired {
                token: self.token.to_string(),
            });
        }
        Ok(())
    }
}

/// Storage for pending verification requests.
#[async_trait]
pub trait PendingStore: Send + Sync {
    async fn insert(&self, request: &PendingVerification) -> Result<(), StoreError>;

    async fn get(
        &self,
        token: &VerificationToken,
    ) -> Result<Option<PendingVerification>, StoreError>;

    /// Marks the request consumed if it is not already.
    ///
    /// Returns false if another caller consumed it first.
    async fn mark_consumed(
        &self,
        token: &VerificationToken,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Deletes requests that expired before `now`, returning how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Issues a verification link for a member.
///
/// # Errors
///
/// Returns an error if the request cannot be stored.
#[instrument(skip(store))]
pub async fn begin_verification(
    store: &dyn PendingStore,
    platform_user_id: &PlatformUserId,
    community_id: &CommunityId,
    ttl: Duration,
) -> Result<PendingVerification, Report<AuthenticationError>> {
    let request = PendingVerification::new(platform_user_id.clone(), community_id.clone(), ttl);
    store
        .insert(&request)
        .await
        .map_err(AuthenticationError::from)?;
    Ok(request)
}

/// Looks up a request and checks it is still usable.
///
/// # Errors
///
/// Returns `RequestNotFound`, `RequestConsumed` or `RequestExpired`.
#[instrument(skip(store))]
pub async fn open_verification(
    store: &dyn PendingStore,
    token: &VerificationToken,
) -> Result<PendingVerification, Report<AuthenticationError>> {
    let request = store
        .get(token)
        .await
        .map_err(AuthenticationError::from)?
        .ok_or_else(|| AuthenticationError::RequestNotFound {
            token: token.to_string(),
        })?;
    request.check(Utc::now())?;
    Ok(request)
}

/// Consumes a request and writes the identity the provider vouched for.
///
/// The request is consumed before the identity is written, so a replayed
/// callback fails even if the first one is still in flight.
///
/// # Errors
///
/// Returns a request error if the link is unknown, expired or used, and a
/// store error if either store fails.
#[instrument(skip(pending, identities, update))]
pub async fn complete_verification(
    pending: &dyn PendingStore,
    identities: &dyn IdentityStore,
    token: &VerificationToken,
    update: IdentityUpdate,
) -> Result<(PendingVerification, IdentityRecord), Report<AuthenticationError>> {
    let request = open_verification(pending, token).await?;

    let consumed = pending
        .mark_consumed(token, Utc::now())
        .await
        .map_err(AuthenticationError::from)?;
    if !consumed {
        return Err(AuthenticationError::RequestConsumed {
            token: token.to_string(),
        }
        .into());
    }

    let record = campus_gate_verification::upsert_identity(
        identities,
        request.platform_user_id(),
        update,
    )
    .await
    .map_err(AuthenticationError::from)?;

    info!(
        user = %request.platform_user_id(),
        community = %request.community_id(),
        verified = record.verified(),
        "verification completed"
    );
    Ok((request, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPendingStore;
    use campus_gate_core::ExternalId;
    use campus_gate_verification::memory::InMemoryIdentityStore;
    use chrono::TimeZone;

    fn update() -> IdentityUpdate {
        IdentityUpdate {
            external_id: Some(ExternalId::new("j2smith")),
            department: Some("Math".to_string()),
            entrance_date: Some(Utc.with_ymd_and_hms(2022, 4, 1, 0, 0, 0).unwrap()),
            display_name: None,
            given_name: None,
        }
    }

    fn member() -> PlatformUserId {
        PlatformUserId::new("42")
    }

    fn community() -> CommunityId {
        CommunityId::new("g1")
    }

    #[test]
    fn generated_tokens_are_unique() {
        assert_ne!(VerificationToken::generate(), VerificationToken::generate());
    }

    #[test]
    fn check_rejects_expired_and_consumed() {
        let request = PendingVerification::new(member(), community(), Duration::minutes(10));
        assert!(request.check(Utc::now()).is_ok());
        assert!(matches!(
            request.check(Utc::now() + Duration::minutes(11)),
            Err(AuthenticationError::RequestExpired { .. })
        ));

        let consumed = PendingVerification::with_all_fields(
            request.token().clone(),
            member(),
            community(),
            request.created_at(),
            request.expires_at(),
            Some(Utc::now()),
        );
        assert!(matches!(
            consumed.check(Utc::now()),
            Err(AuthenticationError::RequestConsumed { .. })
        ));
    }

    #[tokio::test]
    async fn completes_for_the_member_the_link_was_issued_to() {
        let pending = InMemoryPendingStore::new();
        let identities = InMemoryIdentityStore::new();
        let request = begin_verification(&pending, &member(), &community(), Duration::minutes(10))
            .await
            .unwrap();

        let (completed, record) =
            complete_verification(&pending, &identities, request.token(), update())
                .await
                .unwrap();

        assert_eq!(completed.community_id(), &community());
        assert_eq!(record.platform_user_id(), &member());
        assert!(record.verified());
        assert!(identities.get(&member()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn link_cannot_be_used_twice() {
        let pending = InMemoryPendingStore::new();
        let identities = InMemoryIdentityStore::new();
        let request = begin_verification(&pending, &member(), &community(), Duration::minutes(10))
            .await
            .unwrap();

        complete_verification(&pending, &identities, request.token(), update())
            .await
            .unwrap();
        let err = complete_verification(&pending, &identities, request.token(), update())
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            AuthenticationError::RequestConsumed { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let pending = InMemoryPendingStore::new();
        let err = open_verification(&pending, &VerificationToken::from("nope"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            AuthenticationError::RequestNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn expired_link_does_not_write_identity() {
        let pending = InMemoryPendingStore::new();
        let identities = InMemoryIdentityStore::new();
        let request = begin_verification(&pending, &member(), &community(), Duration::zero())
            .await
            .unwrap();

        let err = complete_verification(&pending, &identities, request.token(), update())
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            AuthenticationError::RequestExpired { .. }
        ));
        assert!(identities.get(&member()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_expired_keeps_live_requests() {
        let pending = InMemoryPendingStore::new();
        begin_verification(&pending, &member(), &community(), Duration::zero())
            .await
            .unwrap();
        let live = begin_verification(&pending, &member(), &community(), Duration::hours(1))
            .await
            .unwrap();

        let removed = pending
            .delete_expired(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(pending.get(live.token()).await.unwrap().is_some());
    }
}
