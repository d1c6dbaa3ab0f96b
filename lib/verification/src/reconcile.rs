//! Role reconciliation.
//!
//! Brings one member's live roles in line with what the community's rule
//! set says they should hold, then optionally rewrites their nickname.
//! Running it twice with nothing changed in between is a no-op the
//! second time.

use crate::ban::{BanStore, find_active_ban};
use crate::community::{ConfigCache, NicknameMode, NicknamePolicy};
use crate::error::ReconcileError;
use crate::identity::IdentityStore;
use crate::matcher::RoleMatcher;
use crate::overrides::{EffectiveIdentity, OverrideStore, resolve_effective_identity};
use crate::platform::{BotCapability, Member, Platform, PlatformRole};
use crate::rules::RoleRef;
use campus_gate_core::{CommunityId, PlatformUserId, RoleId};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Platform nickname length limit.
pub const MAX_NICKNAME_LEN: usize = 32;

const DEFAULT_AUDIT_REASON: &str = "Role verification";

/// Per-call reconciliation switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Ignore the custom import overlay when matching.
    pub skip_custom_import: bool,
    /// Compute the outcome without changing anything on the platform.
    pub dry_run: bool,
    /// Audit log reason for the role change.
    pub audit_reason: Option<String>,
}

/// Direction of a role change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Add,
    Remove,
}

/// Why a role change was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The bot lacks the manage-roles permission.
    MissingPermission,
    /// The role no longer exists on the platform.
    RoleMissing,
    /// The role is owned by an integration.
    IntegrationManaged,
    /// The role is at or above the bot's highest role.
    AboveBot,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPermission => {
                f.write_str("the bot is missing the Manage Roles permission")
            }
            Self::RoleMissing => f.write_str("the role no longer exists"),
            Self::IntegrationManaged => f.write_str("the role is managed by an integration"),
            Self::AboveBot => f.write_str("the role is higher than the bot's highest role"),
        }
    }
}

/// A role change that could not be made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRole {
    pub role: RoleRef,
    pub change: RoleChange,
    pub reason: SkipReason,
}

impl SkippedRole {
    /// Human-readable diagnostic for whoever triggered the reconciliation.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let verb = match self.change {
            RoleChange::Add => "assigned",
            RoleChange::Remove => "removed",
        };
        format!("Role {} could not be {verb}: {}.", self.role.name, self.reason)
    }
}

/// Result of the nickname step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NameUpdate {
    /// Nickname rewriting is off, there is no name to use, or the member
    /// picked their own nickname and renaming is not forced.
    #[default]
    NotAttempted,
    /// The member's nickname already equals the computed name.
    Unchanged,
    /// The nickname was set (or would be, on a dry run).
    Updated(String),
    /// The bot lacks the manage-nicknames permission.
    MissingPermission,
    /// The platform rejected the change. Role changes are kept.
    Failed { reason: String },
}

/// What a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub assigned: Vec<RoleRef>,
    pub removed: Vec<RoleRef>,
    pub skipped: Vec<SkippedRole>,
    pub name_update: NameUpdate,
    /// The unverified fallback roles were the target.
    pub fallback_used: bool,
    pub dry_run: bool,
}

impl ReconcileOutcome {
    /// Returns true if no role was added or removed.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.assigned.is_empty() && self.removed.is_empty()
    }

    /// Diagnostics for changes that were dropped or only partly applied.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<String> {
        let mut messages: Vec<String> = self.skipped.iter().map(SkippedRole::diagnostic).collect();
        match &self.name_update {
            NameUpdate::MissingPermission => messages.push(
                "Your nickname could not be updated: the bot is missing the Manage Nicknames permission."
                    .to_string(),
            ),
            NameUpdate::Failed { .. } => {
                messages.push("Your nickname could not be updated.".to_string());
            }
            _ => {}
        }
        messages
    }
}

/// Collaborators the reconciler depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub configs: Arc<dyn ConfigCache>,
    pub identities: Arc<dyn IdentityStore>,
    pub overrides: Arc<dyn OverrideStore>,
    pub bans: Arc<dyn BanStore>,
    pub platform: Arc<dyn Platform>,
    pub matcher: RoleMatcher,
}

/// Reconciles members' roles in a community.
#[derive(Clone)]
pub struct Reconciler {
    deps: Collaborators,
}

impl Reconciler {
    #[must_use]
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    #[must_use]
    pub fn collaborators(&self) -> &Collaborators {
        &self.deps
    }

    /// Reconciles one member's roles and nickname.
    ///
    /// Communities with verification disabled or without rules, and users
    /// who are not members, produce an empty outcome.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Banned`] if an active ban covers the user; no
    ///   roles are touched.
    /// - [`ReconcileError::PlatformUnavailable`] if a platform read or the
    ///   role update fails.
    /// - [`ReconcileError::Conflict`] if the override store is inconsistent.
    /// - [`ReconcileError::Store`] if a store read fails.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn reconcile(
        &self,
        user: &PlatformUserId,
        community: &CommunityId,
        options: &ReconcileOptions,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut outcome = ReconcileOutcome {
            dry_run: options.dry_run,
            ..ReconcileOutcome::default()
        };

        let Some(config) = self.deps.configs.fetch(community).await? else {
            return Ok(outcome);
        };
        let Some(rule_set) = config.active_rule_set() else {
            return Ok(outcome);
        };

        let identity = self.deps.identities.get(user).await?;
        let ban =
            find_active_ban(self.deps.bans.as_ref(), community, user, identity.as_ref()).await?;
        if let Some(ban) = ban {
            info!(key = %ban.key, "user is banned, leaving roles untouched");
            return Err(ReconcileError::Banned {
                key: ban.key.to_string(),
            });
        }

        let effective = resolve_effective_identity(
            self.deps.overrides.as_ref(),
            user,
            identity.as_ref(),
            community,
        )
        .await?;
        let mut target = self
            .deps
            .matcher
            .match_roles(Some(&effective), Some(rule_set), options.skip_custom_import)
            .await?;

        let Some(member) = self.deps.platform.member(community, user).await? else {
            return Ok(outcome);
        };

        if target.is_empty() {
            if let Some(fallback) = rule_set.fallback_roles() {
                target = fallback.to_vec();
                outcome.fallback_used = true;
            }
        }

        let managed = rule_set.managed_role_ids();
        let (to_add, to_remove) = diff_roles(&member.roles, &target, &managed);

        let capability = self.deps.platform.bot_capability(community).await?;
        if !to_add.is_empty() || !to_remove.is_empty() {
            let platform_roles = self.deps.platform.roles(community).await?;
            for (role, change) in to_add
                .into_iter()
                .map(|r| (r, RoleChange::Add))
                .chain(to_remove.into_iter().map(|r| (r, RoleChange::Remove)))
            {
                match check_manageable(&role.id, &platform_roles, &capability) {
                    Ok(()) if change == RoleChange::Add => outcome.assigned.push(role),
                    Ok(()) => outcome.removed.push(role),
                    Err(reason) => {
                        warn!(role = %role.id, ?change, %reason, "skipping role change");
                        outcome.skipped.push(SkippedRole {
                            role,
                            change,
                            reason,
                        });
                    }
                }
            }
        }

        if !outcome.is_noop() && !options.dry_run {
            let new_set = apply_changes(&member.roles, &outcome.assigned, &outcome.removed);
            let reason = options
                .audit_reason
                .as_deref()
                .unwrap_or(DEFAULT_AUDIT_REASON);
            self.deps
                .platform
                .set_roles(community, user, &new_set, reason)
                .await?;
        }

        outcome.name_update = self
            .update_nickname(community, &member, &effective, config.nickname, &capability, options)
            .await;

        info!(
            assigned = outcome.assigned.len(),
            removed = outcome.removed.len(),
            skipped = outcome.skipped.len(),
            fallback = outcome.fallback_used,
            "reconciled roles"
        );
        Ok(outcome)
    }

    async fn update_nickname(
        &self,
        community: &CommunityId,
        member: &Member,
        identity: &EffectiveIdentity,
        policy: NicknamePolicy,
        capability: &BotCapability,
        options: &ReconcileOptions,
    ) -> NameUpdate {
        let Some(name) = nickname_for(policy, identity) else {
            return NameUpdate::NotAttempted;
        };
        match member.nickname.as_deref() {
            Some(current) if current == name => return NameUpdate::Unchanged,
            Some(_) if !policy.force_rename => return NameUpdate::NotAttempted,
            _ => {}
        }
        if !capability.can_manage_nicknames {
            return NameUpdate::MissingPermission;
        }
        if options.dry_run {
            return NameUpdate::Updated(name);
        }
        match self
            .deps
            .platform
            .set_nickname(community, &member.user_id, &name)
            .await
        {
            Ok(()) => NameUpdate::Updated(name),
            Err(e) => {
                warn!(error = %e, "nickname update failed");
                NameUpdate::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Computes `(target - current, (current & managed) - target)`.
///
/// Roles outside `managed` are never removed.
#[must_use]
pub fn diff_roles(
    current: &[RoleRef],
    target: &[RoleRef],
    managed: &HashSet<RoleId>,
) -> (Vec<RoleRef>, Vec<RoleRef>) {
    let current_ids: HashSet<&RoleId> = current.iter().map(|r| &r.id).collect();
    let target_ids: HashSet<&RoleId> = target.iter().map(|r| &r.id).collect();

    let mut seen = HashSet::new();
    let to_add = target
        .iter()
        .filter(|r| !current_ids.contains(&r.id) && seen.insert(&r.id))
        .cloned()
        .collect();
    let to_remove = current
        .iter()
        .filter(|r| managed.contains(&r.id) && !target_ids.contains(&r.id))
        .cloned()
        .collect();
    (to_add, to_remove)
}

fn check_manageable(
    role: &RoleId,
    platform_roles: &[PlatformRole],
    capability: &BotCapability,
) -> Result<(), SkipReason> {
    if !capability.can_manage_roles {
        return Err(SkipReason::MissingPermission);
    }
    let existing = platform_roles
        .iter()
        .find(|r| &r.id == role)
        .ok_or(SkipReason::RoleMissing)?;
    if existing.managed {
        return Err(SkipReason::IntegrationManaged);
    }
    if existing.position >= capability.highest_role_position {
        return Err(SkipReason::AboveBot);
    }
    Ok(())
}

fn apply_changes(current: &[RoleRef], assigned: &[RoleRef], removed: &[RoleRef]) -> Vec<RoleId> {
    let removed: HashSet<&RoleId> = removed.iter().map(|r| &r.id).collect();
    let mut roles: Vec<RoleId> = current
        .iter()
        .map(|r| r.id.clone())
        .filter(|id| !removed.contains(id))
        .collect();
    for role in assigned {
        if !roles.contains(&role.id) {
            roles.push(role.id.clone());
        }
    }
    roles
}

/// Computes the nickname a policy asks for, truncated to the platform limit.
#[must_use]
pub fn nickname_for(policy: NicknamePolicy, identity: &EffectiveIdentity) -> Option<String> {
    let name = match policy.mode? {
        NicknameMode::FullName => identity.display_name.clone()?,
        NicknameMode::FirstName => match &identity.given_name {
            Some(given) => given.clone(),
            None => identity
                .display_name
                .as_deref()?
                .split_whitespace()
                .next()?
                .to_string(),
        },
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(name.chars().take(MAX_NICKNAME_LEN).collect())
}
