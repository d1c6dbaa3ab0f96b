//! Chat-platform collaborator.
//!
//! The engine never talks to the platform's gateway or REST API directly;
//! it goes through the [`Platform`] trait. Implementations own timeouts and
//! retries, so every call is a single failable operation here.

use crate::error::PlatformError;
use crate::rules::RoleRef;
use async_trait::async_trait;
use campus_gate_core::{CommunityId, PlatformUserId, RoleId};
use serde::{Deserialize, Serialize};

/// A role as it currently exists on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRole {
    pub id: RoleId,
    pub name: String,
    /// Hierarchy position; higher positions outrank lower ones.
    pub position: i64,
    /// Roles owned by an integration cannot be granted by anyone.
    #[serde(default)]
    pub managed: bool,
}

impl PlatformRole {
    #[must_use]
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>, position: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            managed: false,
        }
    }

    #[must_use]
    pub fn to_role_ref(&self) -> RoleRef {
        RoleRef::new(self.id.clone(), self.name.clone())
    }
}

/// Live membership of a user in a community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: PlatformUserId,
    pub roles: Vec<RoleRef>,
    pub nickname: Option<String>,
}

/// What the bot itself may do in a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCapability {
    /// Position of the bot's highest role; it can only manage roles below it.
    pub highest_role_position: i64,
    pub can_manage_roles: bool,
    pub can_manage_nicknames: bool,
}

/// Trait for the chat-platform client.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Reads a member's live role membership. `None` if the user is not a member.
    async fn member(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
    ) -> Result<Option<Member>, PlatformError>;

    /// Lists the user ids of every member of the community.
    async fn member_ids(&self, community: &CommunityId)
    -> Result<Vec<PlatformUserId>, PlatformError>;

    /// Lists the roles that currently exist in the community.
    async fn roles(&self, community: &CommunityId) -> Result<Vec<PlatformRole>, PlatformError>;

    /// Returns the bot's role-hierarchy position and permissions.
    async fn bot_capability(&self, community: &CommunityId)
    -> Result<BotCapability, PlatformError>;

    /// Replaces a member's full role set in one call.
    async fn set_roles(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        roles: &[RoleId],
        audit_reason: &str,
    ) -> Result<(), PlatformError>;

    /// Sets a member's nickname.
    async fn set_nickname(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        nickname: &str,
    ) -> Result<(), PlatformError>;

    /// Issues a platform-level ban.
    async fn ban(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        audit_reason: &str,
    ) -> Result<(), PlatformError>;

    /// Lifts a platform-level ban.
    async fn unban(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
        audit_reason: &str,
    ) -> Result<(), PlatformError>;

    /// Returns true if the user currently has a platform-level ban.
    async fn is_banned(
        &self,
        community: &CommunityId,
        user: &PlatformUserId,
    ) -> Result<bool, PlatformError>;
}
