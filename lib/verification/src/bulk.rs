//! Community-wide reconciliation.
//!
//! Reconciles every member of a community one after another with a
//! pacing delay in between. Each member's reconciliation is independent:
//! a failure is recorded and the run moves on, and a cancelled run keeps
//! everything it already did. Re-running picks up where it left off
//! because reconciling an up-to-date member is a no-op.

use crate::error::{BulkError, ReconcileError};
use crate::reconcile::{ReconcileOptions, Reconciler};
use campus_gate_core::{CommunityId, PlatformUserId};
use rootcause::Report;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Default delay between two members.
pub const DEFAULT_PACING: Duration = Duration::from_millis(1500);

/// Tally of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub total: usize,
    pub completed: usize,
    pub banned: usize,
    pub failed: Vec<(PlatformUserId, ReconcileError)>,
    /// The run stopped before reaching every member.
    pub cancelled: bool,
}

impl BulkSummary {
    /// Members the run did not reach.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total - self.completed - self.banned - self.failed.len()
    }
}

/// Runs reconciliation across a whole community.
#[derive(Clone)]
pub struct BulkReconciler {
    reconciler: Reconciler,
    pacing: Duration,
    options: ReconcileOptions,
}

impl BulkReconciler {
    #[must_use]
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            pacing: DEFAULT_PACING,
            options: ReconcileOptions::default(),
        }
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Reconciles every current member of `community`.
    ///
    /// Cancellation is honoured between members and during the pacing
    /// delay, never in the middle of one member's reconciliation.
    ///
    /// # Errors
    ///
    /// Fails before touching anyone if the configuration or the member
    /// list cannot be loaded.
    #[instrument(skip(self, cancel))]
    pub async fn run(
        &self,
        community: &CommunityId,
        cancel: &CancellationToken,
    ) -> Result<BulkSummary, Report<BulkError>> {
        let deps = self.reconciler.collaborators();
        let config = deps
            .configs
            .fetch(community)
            .await
            .map_err(|e| BulkError::ConfigUnavailable {
                community: community.clone(),
                reason: e.to_string(),
            })?;
        if config.as_ref().and_then(|c| c.active_rule_set()).is_none() {
            info!("verification is not active, nothing to do");
            return Ok(BulkSummary::default());
        }

        let members = deps
            .platform
            .member_ids(community)
            .await
            .map_err(|e| BulkError::MemberListUnavailable {
                community: community.clone(),
                reason: e.to_string(),
            })?;

        let mut summary = BulkSummary {
            total: members.len(),
            ..BulkSummary::default()
        };
        info!(members = summary.total, "starting bulk reconciliation");

        for (index, user) in members.into_iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(self.pacing) => {}
                }
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match self.reconciler.reconcile(&user, community, &self.options).await {
                Ok(_) => summary.completed += 1,
                Err(ReconcileError::Banned { .. }) => summary.banned += 1,
                Err(e) => {
                    warn!(%user, error = %e, "reconciliation failed, continuing");
                    summary.failed.push((user, e));
                }
            }
        }

        info!(
            completed = summary.completed,
            banned = summary.banned,
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            "bulk reconciliation finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ban::BanService;
    use crate::community::{CachedConfig, CommunityConfig, ConfigSource};
    use crate::identity::{IdentityUpdate, upsert_identity};
    use crate::matcher::RoleMatcher;
    use crate::memory::{
        InMemoryBanStore, InMemoryConfigSource, InMemoryIdentityStore, InMemoryOverrideStore,
        InMemoryPlatform,
    };
    use crate::overlay::{CustomImportTable, Sha256Hasher};
    use crate::platform::{Member, PlatformRole};
    use crate::reconcile::Collaborators;
    use crate::rules::{RoleRef, Rule, RuleSet};
    use std::sync::Arc;

    struct Fixture {
        bulk: BulkReconciler,
        identities: Arc<InMemoryIdentityStore>,
        bans: Arc<InMemoryBanStore>,
        platform: Arc<InMemoryPlatform>,
    }

    fn community() -> CommunityId {
        CommunityId::new("g1")
    }

    async fn fixture(members: &[&str]) -> Fixture {
        let source = InMemoryConfigSource::new();
        source
            .store(&CommunityConfig::new(community()).with_rule_set(
                RuleSet::new(vec![Rule::anyone(vec![RoleRef::new("v", "Verified")])])
                    .with_unverified_roles(vec![RoleRef::new("u", "Unverified")]),
            ))
            .await
            .unwrap();
        let identities = Arc::new(InMemoryIdentityStore::new());
        let bans = Arc::new(InMemoryBanStore::new());
        let platform = Arc::new(InMemoryPlatform::new());
        platform.add_role(&community(), PlatformRole::new("v", "Verified", 1));
        platform.add_role(&community(), PlatformRole::new("u", "Unverified", 1));
        for id in members {
            platform.add_member(
                &community(),
                Member {
                    user_id: PlatformUserId::new(*id),
                    roles: Vec::new(),
                    nickname: None,
                },
            );
        }
        let reconciler = Reconciler::new(Collaborators {
            configs: Arc::new(CachedConfig::new(source)),
            identities: identities.clone(),
            overrides: Arc::new(InMemoryOverrideStore::new()),
            bans: bans.clone(),
            platform: platform.clone(),
            matcher: RoleMatcher::new(
                Arc::new(CustomImportTable::default()),
                Arc::new(Sha256Hasher),
            ),
        });
        Fixture {
            bulk: BulkReconciler::new(reconciler).with_pacing(Duration::from_secs(2)),
            identities,
            bans,
            platform,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconciles_every_member_with_pacing() {
        let f = fixture(&["a", "b", "c"]).await;
        let started = tokio::time::Instant::now();

        let summary = f.bulk.run(&community(), &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.remaining(), 0);
        assert!(!summary.cancelled);
        assert_eq!(f.platform.role_updates().len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn rerun_is_a_noop() {
        let f = fixture(&["a", "b"]).await;
        f.bulk.run(&community(), &CancellationToken::new()).await.unwrap();
        let summary = f.bulk.run(&community(), &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(f.platform.role_updates().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn banned_members_are_counted_and_run_continues() {
        let f = fixture(&["a", "b", "c"]).await;
        upsert_identity(
            f.identities.as_ref(),
            &PlatformUserId::new("z"),
            IdentityUpdate::default(),
        )
        .await
        .unwrap();
        BanService::new(f.identities.clone(), f.bans.clone(), f.platform.clone())
            .ban(
                &community(),
                &PlatformUserId::new("z"),
                "spam",
                &PlatformUserId::new("admin"),
            )
            .await
            .unwrap();
        // Rejoined through a platform that lost the ban.
        f.platform.add_member(
            &community(),
            Member {
                user_id: PlatformUserId::new("z"),
                roles: Vec::new(),
                nickname: None,
            },
        );

        let summary = f.bulk.run(&community(), &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.banned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_before_first_member() {
        let f = fixture(&["a", "b"]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = f.bulk.run(&community(), &cancel).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.remaining(), 2);
        assert!(f.platform.role_updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_pacing_keeps_completed_work() {
        let f = fixture(&["a", "b", "c"]).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let summary = f.bulk.run(&community(), &cancel).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.remaining(), 2);
        assert_eq!(f.platform.role_updates().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn member_list_failure_aborts_run() {
        let f = fixture(&["a"]).await;
        f.platform.set_unavailable(true);

        let result = f.bulk.run(&community(), &CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_community_does_nothing() {
        let f = fixture(&["a"]).await;
        let summary = f
            .bulk
            .run(&CommunityId::new("other"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary, BulkSummary::default());
    }
}
