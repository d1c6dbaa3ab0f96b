//! Per-community configuration and its cache.
//!
//! The engine reads configuration through the injected [`ConfigCache`]
//! rather than a process-wide map, so tests can substitute their own.

use crate::error::{ConfigError, StoreError};
use crate::rules::RuleSet;
use async_trait::async_trait;
use campus_gate_core::CommunityId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Which part of the verified name becomes the member's nickname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NicknameMode {
    FullName,
    FirstName,
}

/// Nickname rewriting settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NicknamePolicy {
    /// `None` disables nickname rewriting.
    #[serde(default)]
    pub mode: Option<NicknameMode>,
    /// Rename members who already chose a nickname.
    #[serde(default)]
    pub force_rename: bool,
}

/// Verification settings of one community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityConfig {
    pub community_id: CommunityId,
    #[serde(default)]
    pub verification_enabled: bool,
    #[serde(default)]
    pub rule_set: Option<RuleSet>,
    #[serde(default)]
    pub nickname: NicknamePolicy,
}

impl CommunityConfig {
    /// Creates a configuration with verification disabled and no rules.
    #[must_use]
    pub fn new(community_id: CommunityId) -> Self {
        Self {
            community_id,
            verification_enabled: false,
            rule_set: None,
            nickname: NicknamePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.verification_enabled = true;
        self.rule_set = Some(rule_set);
        self
    }

    #[must_use]
    pub fn with_nickname(mut self, policy: NicknamePolicy) -> Self {
        self.nickname = policy;
        self
    }

    /// Returns the rule set if verification is enabled and has rules.
    #[must_use]
    pub fn active_rule_set(&self) -> Option<&RuleSet> {
        if !self.verification_enabled {
            return None;
        }
        self.rule_set.as_ref().filter(|set| !set.rules.is_empty())
    }
}

/// Durable storage for community configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Loads a community's configuration.
    async fn load(&self, community: &CommunityId) -> Result<Option<CommunityConfig>, StoreError>;

    /// Stores a community's configuration.
    async fn store(&self, config: &CommunityConfig) -> Result<(), StoreError>;
}

/// Read access to community configuration with explicit invalidation.
#[async_trait]
pub trait ConfigCache: Send + Sync {
    /// Returns the configuration, loading it on a cache miss.
    async fn fetch(&self, community: &CommunityId)
    -> Result<Option<Arc<CommunityConfig>>, StoreError>;

    /// Drops any cached copy so the next fetch reloads it.
    async fn invalidate(&self, community: &CommunityId);
}

/// A [`ConfigCache`] that memoizes a [`ConfigSource`].
///
/// Each community carries a generation that [`ConfigCache::invalidate`]
/// bumps. A load that started before an invalidation is returned to its
/// caller but never cached.
pub struct CachedConfig<S> {
    source: S,
    entries: RwLock<Entries>,
}

#[derive(Default)]
struct Entries {
    cached: HashMap<CommunityId, Option<Arc<CommunityConfig>>>,
    generations: HashMap<CommunityId, u64>,
}

impl Entries {
    fn generation(&self, community: &CommunityId) -> u64 {
        self.generations.get(community).copied().unwrap_or_default()
    }
}

impl<S: ConfigSource> CachedConfig<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Returns the underlying source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: ConfigSource> ConfigCache for CachedConfig<S> {
    async fn fetch(
        &self,
        community: &CommunityId,
    ) -> Result<Option<Arc<CommunityConfig>>, StoreError> {
        let generation = {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.cached.get(community) {
                return Ok(entry.clone());
            }
            entries.generation(community)
        };

        let loaded = self.source.load(community).await?.map(Arc::new);
        let mut entries = self.entries.write().await;
        if entries.generation(community) == generation {
            entries.cached.insert(community.clone(), loaded.clone());
            debug!(%community, found = loaded.is_some(), "loaded community configuration");
        } else {
            debug!(%community, "configuration changed during load, not caching");
        }
        Ok(loaded)
    }

    async fn invalidate(&self, community: &CommunityId) {
        let mut entries = self.entries.write().await;
        entries.cached.remove(community);
        *entries.generations.entry(community.clone()).or_default() += 1;
    }
}

/// Validates and stores a community configuration, then invalidates the cache.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] without writing anything if the rule
/// set fails validation.
#[instrument(skip_all, fields(community = %config.community_id))]
pub async fn save_config(
    source: &dyn ConfigSource,
    cache: &dyn ConfigCache,
    config: &CommunityConfig,
) -> Result<(), ConfigError> {
    if let Some(rule_set) = &config.rule_set {
        rule_set.validate()?;
    }
    source.store(config).await?;
    cache.invalidate(&config.community_id).await;
    Ok(())
}
