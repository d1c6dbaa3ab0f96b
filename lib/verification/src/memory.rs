//! In-memory collaborator implementations.
//!
//! Used by the engine's tests and by anything that wants to run the
//! engine without a database or a live chat platform.

use crate::ban::{BanKey, BanRecord, BanStore};
use crate::community::{CommunityConfig, ConfigSource};
use crate::error::{PlatformError, StoreError};
use crate::identity::{IdentityRecord, IdentityStore};
use crate::overrides::{OverrideRecord, OverrideStore};
use crate::platform::{BotCapability, Member, Platform, PlatformRole};
use crate::rules::RoleRef;
use async_trait::async_trait;
use campus_gate_core::{CommunityId, ExternalId, OverrideId, PlatformUserId, RoleId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identity records keyed by platform account.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    records: Mutex<HashMap<PlatformUserId, IdentityRecord>>,
}

impl InMemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get(&self, user: &PlatformUserId) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(lock(&self.records).get(user).cloned())
    }

    async fn find_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Vec<IdentityRecord>, StoreError> {
        Ok(lock(&self.records)
            .values()
            .filter(|record| record.external_id() == Some(external_id))
            .cloned()
            .collect())
    }

    async fn save(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        lock(&self.records).insert(record.platform_user_id().clone(), record.clone());
        Ok(())
    }
}

/// Community configurations keyed by community.
#[derive(Debug, Default)]
pub struct InMemoryConfigSource {
    configs: Mutex<HashMap<CommunityId, CommunityConfig>>,
}

impl InMemoryConfigSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigSource for InMemoryConfigSource {
    async fn load(&self, community: &CommunityId) -> Result<Option<CommunityConfig>, StoreError> {
        Ok(lock(&self.configs).get(community).cloned())
    }

    async fn store(&self, config: &CommunityConfig) -> Result<(), StoreError> {
        lock(&self.configs).insert(config.community_id.clone(), config.clone());
        Ok(())
    }
}

/// Overrides keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryOverrideStore {
    records: Mutex<HashMap<OverrideId, OverrideRecord>>,
}

impl InMemoryOverrideStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OverrideStore for InMemoryOverrideStore {
    async fn get(&self, id: &OverrideId) -> Result<Option<OverrideRecord>, StoreError> {
        Ok(lock(&self.records).get(id).cloned())
    }

    async fn active_for_user(
        &self,
        user: &PlatformUserId,
    ) -> Result<Vec<OverrideRecord>, StoreError> {
        let mut active: Vec<OverrideRecord> = lock(&self.records)
            .values()
            .filter(|record| record.is_active() && &record.target_user_id == user)
            .cloned()
            .collect();
        active.sort_by_key(|record| record.created_at);
        Ok(active)
    }

    async fn save(&self, record: &OverrideRecord) -> Result<(), StoreError> {
        lock(&self.records).insert(record.id, record.clone());
        Ok(())
    }
}

/// Ban records in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryBanStore {
    records: Mutex<Vec<BanRecord>>,
}

impl InMemoryBanStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BanStore for InMemoryBanStore {
    async fn active(
        &self,
        community: &CommunityId,
        key: &BanKey,
    ) -> Result<Option<BanRecord>, StoreError> {
        Ok(lock(&self.records)
            .iter()
            .find(|r| r.is_active() && &r.community_id == community && &r.key == key)
            .cloned())
    }

    async fn list(&self, community: &CommunityId) -> Result<Vec<BanRecord>, StoreError> {
        Ok(lock(&self.records)
            .iter()
            .filter(|r| &r.community_id == community)
            .cloned()
            .collect())
    }

    async fn save(&self, record: &BanRecord) -> Result<(), StoreError> {
        let mut records = lock(&self.records);
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }
}

/// A role-set replacement observed by [`InMemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleUpdate {
    pub community: CommunityId,
    pub user: PlatformUserId,
    pub roles: Vec<RoleId>,
    pub audit_reason: String,
}

#[derive(Debug, Default)]
struct PlatformState {
    roles: HashMap<CommunityId, Vec<PlatformRole>>,
    members: HashMap<CommunityId, Vec<Member>>,
    capabilities: HashMap<CommunityId, BotCapability>,
    bans: HashMap<(CommunityId, PlatformUserId), String>,
    role_updates: Vec<RoleUpdate>,
    nickname_updates: Vec<(PlatformUserId, String)>,
    unavailable: bool,
    nicknames_forbidden: bool,
}

/// A scripted chat platform that records every mutation.
///
/// Communities without an explicit capability give the bot full
/// permissions at position 100.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_role(&self, community: &CommunityId, role: PlatformRole) {
        lock(&self.state)
            .roles
            .entry(community.clone())
            .or_default()
            .push(role);
    }

    pub fn add_member(&self, community: &CommunityId, member: Member) {
        let mut state = lock(&self.state);
        let members = state.members.entry(community.clone()).or_default();
        members.retain(|m| m.user_id != member.user_id);
        members.push(member);
    }

    pub fn set_capability(&self, community: &CommunityId, capability: BotCapability) {
        lock(&self.state)
            .capabilities
            .insert(community.clone(), capability);
    }

    /// Makes every subsequent call fail with [`PlatformError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// Makes nickname changes fail with [`PlatformError::Forbidden`].
    pub fn forbid_nicknames(&self, forbidden: bool) {
        lock(&self.state).nicknames_forbidden = forbidden;
    }

    /// Returns the live role ids of a member.
    #[must_use]
    pub fn member_role_ids(&self, community: &CommunityId, user: &PlatformUserId) -> Vec<RoleId> {
        self.find_member(community, user)
            .map(|m| m.roles.into_iter().map(|r| r.id).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn nickname(&self, community: &CommunityId, user: &PlatformUserId) -> Option<String> {
        self.find_member(community, user).and_then(|m| m.nickname)
    }

    #[must_use]
    pub fn role_updates(&self) -> Vec<RoleUpdate> {
        lock(&self.state).role_updates.clone()
    }

    #[must_use]
    pub fn nickname_updates(&self) -> Vec<(PlatformUserId, String)> {
        lock(&self.state).nickname_updates.clone()
    }

    /// Returns the audit reason of an active platform ban.
    #[must_use]
    pub fn ban_reason(&self, community: &CommunityId, user: &PlatformUserId) -> Option<String> {
        lock(&self.state)
            .bans
            .get(&(community.clone(), user.clone()))
            .cloned()
    }

    fn find_member(&self, community: &CommunityId, user: &PlatformUserId) -> Option<Member> {
        lock(&self.state)
            .members
            .get(community)
            .and_then(|members| members.iter().find(|m| &m.user_id == user))
            .cloned()
    }

    fn available(&self) -> Result<MutexGuard<'_, PlatformState>, PlatformError> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(PlatformError::Unavailable {
                reason: "simulated outage".to_string(),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn member(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
    ) -> Result<Option<Member>, PlatformError> {
        let state = self.available()?;
        Ok(state
            .members
            .get(community)
            .and_then(|members| members.iter().find(|m| &m.user_id == user))
            .cloned())
    }

    async fn member_ids(
        &self,
        community: &CommunityId,
    ) -> Result<Vec<PlatformUserId>, PlatformError> {
        let state = self.available()?;
        Ok(state
            .members
            .get(community)
            .map(|members| members.iter().map(|m| m.user_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn roles(&self, community: &CommunityId) -> Result<Vec<PlatformRole>, PlatformError> {
        let state = self.available()?;
        Ok(state.roles.get(community).cloned().unwrap_or_default())
    }

    async fn bot_capability(
        &self,
        community: &CommunityId,
    ) -> Result<BotCapability, PlatformError> {
        let state = self.available()?;
        Ok(state
            .capabilities
            .get(community)
            .copied()
            .unwrap_or(BotCapability {
                highest_role_position: 100,
                can_manage_roles: true,
                can_manage_nicknames: true,
            }))
    }

    async fn set_roles(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        roles: &[RoleId],
        audit_reason: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.available()?;
        let known = state.roles.get(community).cloned().unwrap_or_default();
        let refs: Vec<RoleRef> = roles
            .iter()
            .map(|id| {
                known
                    .iter()
                    .find(|r| &r.id == id)
                    .map_or_else(
                        || RoleRef::new(id.clone(), id.as_str()),
                        PlatformRole::to_role_ref,
                    )
            })
            .collect();
        let member = state
            .members
            .get_mut(community)
            .and_then(|members| members.iter_mut().find(|m| &m.user_id == user))
            .ok_or_else(|| PlatformError::NotFound {
                what: format!("member {user}"),
            })?;
        member.roles = refs;
        state.role_updates.push(RoleUpdate {
            community: community.clone(),
            user: user.clone(),
            roles: roles.to_vec(),
            audit_reason: audit_reason.to_string(),
        });
        Ok(())
    }

    async fn set_nickname(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        nickname: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.available()?;
        if state.nicknames_forbidden {
            return Err(PlatformError::Forbidden {
                action: "change nickname".to_string(),
            });
        }
        let member = state
            .members
            .get_mut(community)
            .and_then(|members| members.iter_mut().find(|m| &m.user_id == user))
            .ok_or_else(|| PlatformError::NotFound {
                what: format!("member {user}"),
            })?;
        member.nickname = Some(nickname.to_string());
        state
            .nickname_updates
            .push((user.clone(), nickname.to_string()));
        Ok(())
    }

    async fn ban(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        audit_reason: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.available()?;
        if let Some(members) = state.members.get_mut(community) {
            members.retain(|m| &m.user_id != user);
        }
        state
            .bans
            .insert((community.clone(), user.clone()), audit_reason.to_string());
        Ok(())
    }

    async fn unban(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        _audit_reason: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.available()?;
        state.bans.remove(&(community.clone(), user.clone()));
        Ok(())
    }

    async fn is_banned(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
    ) -> Result<bool, PlatformError> {
        let state = self.available()?;
        Ok(state.bans.contains_key(&(community.clone(), user.clone())))
    }
}
