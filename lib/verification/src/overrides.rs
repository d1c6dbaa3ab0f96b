//! Manual overrides of identity attributes.
//!
//! Staff can override a user's department or entrance date either
//! globally or for one community. Overrides are never physically
//! removed: deleting one marks it [`OverrideState::Deleted`] so the audit
//! trail survives.
//!
//! Precedence when building an [`EffectiveIdentity`] for a community,
//! field by field: community override, then global override, then the
//! identity record.

use crate::error::{OverrideError, StoreError};
use crate::identity::{IdentityRecord, IdentityStore};
use crate::matcher::RoleMatcher;
use crate::rules::{RoleRef, RuleSet};
use async_trait::async_trait;
use campus_gate_core::{CommunityId, ExternalId, OverrideId, PlatformUserId};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// Where an override applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "communityId", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideScope {
    Global,
    Community(CommunityId),
}

impl OverrideScope {
    /// Returns the community id for community-scoped overrides.
    #[must_use]
    pub fn community_id(&self) -> Option<&CommunityId> {
        match self {
            Self::Global => None,
            Self::Community(id) => Some(id),
        }
    }
}

impl fmt::Display for OverrideScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Community(id) => write!(f, "community {id}"),
        }
    }
}

/// Soft-deletion state of an override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OverrideState {
    Active,
    Deleted {
        #[serde(rename = "deletedAt")]
        at: DateTime<Utc>,
        #[serde(rename = "deletedBy")]
        by: PlatformUserId,
    },
}

/// A stored override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    pub id: OverrideId,
    pub target_user_id: PlatformUserId,
    #[serde(flatten)]
    pub scope: OverrideScope,
    /// `None` falls through to the next layer.
    pub department: Option<String>,
    /// `None` falls through to the next layer.
    pub entrance_date: Option<DateTime<Utc>>,
    pub created_by: PlatformUserId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: OverrideState,
}

impl OverrideRecord {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, OverrideState::Active)
    }
}

/// Request to create an override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOverride {
    pub target_user_id: PlatformUserId,
    pub scope: OverrideScope,
    pub department: Option<String>,
    pub entrance_date: Option<DateTime<Utc>>,
}

impl NewOverride {
    fn validate(&self) -> Result<(), OverrideError> {
        if self.department.is_none() && self.entrance_date.is_none() {
            return Err(OverrideError::Empty {
                user: self.target_user_id.clone(),
            });
        }
        Ok(())
    }

    fn into_record(self, created_by: PlatformUserId, created_at: DateTime<Utc>) -> OverrideRecord {
        OverrideRecord {
            id: OverrideId::new(),
            target_user_id: self.target_user_id,
            scope: self.scope,
            department: self.department,
            entrance_date: self.entrance_date,
            created_by,
            created_at,
            state: OverrideState::Active,
        }
    }
}

/// Which layer an effective field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Absent,
    Identity,
    GlobalOverride,
    CommunityOverride,
}

/// An identity record merged with the overrides that apply in one community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveIdentity {
    pub platform_user_id: PlatformUserId,
    pub external_id: Option<ExternalId>,
    pub verified: bool,
    pub department: Option<String>,
    pub entrance_date: Option<DateTime<Utc>>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub department_source: FieldSource,
    pub entrance_date_source: FieldSource,
}

impl EffectiveIdentity {
    /// Returns the calendar year of the effective entrance date.
    #[must_use]
    pub fn entrance_year(&self) -> Option<i32> {
        self.entrance_date.map(|date| date.year())
    }

    /// Returns true if any field was supplied by an override.
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        [self.department_source, self.entrance_date_source]
            .iter()
            .any(|source| {
                matches!(
                    source,
                    FieldSource::GlobalOverride | FieldSource::CommunityOverride
                )
            })
    }
}

/// Merges an identity record with the applicable overrides.
///
/// `verified` is recomputed from the merged result: it holds when both a
/// department and an entrance date are present, whichever layer supplied
/// them. Staff can therefore make an unverified user matchable.
#[must_use]
pub fn merge_overrides(
    user: &PlatformUserId,
    identity: Option<&IdentityRecord>,
    global: Option<&OverrideRecord>,
    community: Option<&OverrideRecord>,
) -> EffectiveIdentity {
    let mut department = identity.and_then(|r| r.department().map(str::to_string));
    let mut department_source = source_of(&department, FieldSource::Identity);
    let mut entrance_date = identity.and_then(IdentityRecord::entrance_date);
    let mut entrance_date_source = source_of(&entrance_date, FieldSource::Identity);

    let layers = [
        (global, FieldSource::GlobalOverride),
        (community, FieldSource::CommunityOverride),
    ];
    for (layer, source) in layers {
        let Some(layer) = layer else { continue };
        if let Some(value) = &layer.department {
            department = Some(value.clone());
            department_source = source;
        }
        if let Some(value) = layer.entrance_date {
            entrance_date = Some(value);
            entrance_date_source = source;
        }
    }

    let mut effective = EffectiveIdentity {
        platform_user_id: user.clone(),
        external_id: identity.and_then(|r| r.external_id().cloned()),
        verified: false,
        department,
        entrance_date,
        display_name: identity.and_then(|r| r.display_name().map(str::to_string)),
        given_name: identity.and_then(|r| r.given_name().map(str::to_string)),
        department_source,
        entrance_date_source,
    };
    effective.verified = effective.department.is_some() && effective.entrance_date.is_some();
    effective
}

fn source_of<T>(value: &Option<T>, source: FieldSource) -> FieldSource {
    if value.is_some() {
        source
    } else {
        FieldSource::Absent
    }
}

/// Picks the global and community layers out of a user's active overrides.
///
/// # Errors
///
/// Returns [`OverrideError::Conflict`] if either scope has more than one
/// active override.
pub fn select_layers<'a>(
    user: &PlatformUserId,
    overrides: &'a [OverrideRecord],
    community: &CommunityId,
) -> Result<(Option<&'a OverrideRecord>, Option<&'a OverrideRecord>), OverrideError> {
    let global = single_active(user, overrides, &OverrideScope::Global)?;
    let scoped = single_active(user, overrides, &OverrideScope::Community(community.clone()))?;
    Ok((global, scoped))
}

fn single_active<'a>(
    user: &PlatformUserId,
    overrides: &'a [OverrideRecord],
    scope: &OverrideScope,
) -> Result<Option<&'a OverrideRecord>, OverrideError> {
    let mut matching = overrides
        .iter()
        .filter(|o| o.is_active() && &o.target_user_id == user && &o.scope == scope);
    let first = matching.next();
    let extra = matching.count();
    if extra > 0 {
        return Err(OverrideError::Conflict {
            user: user.clone(),
            scope: scope.clone(),
            count: extra + 1,
        });
    }
    Ok(first)
}

/// Storage for overrides.
#[async_trait]
pub trait OverrideStore: Send + Sync {
    /// Gets an override by id, active or deleted.
    async fn get(&self, id: &OverrideId) -> Result<Option<OverrideRecord>, StoreError>;

    /// Lists a user's active overrides across all scopes.
    async fn active_for_user(&self, user: &PlatformUserId)
    -> Result<Vec<OverrideRecord>, StoreError>;

    /// Inserts or replaces an override by id.
    async fn save(&self, record: &OverrideRecord) -> Result<(), StoreError>;
}

/// Builds the effective identity of a user in one community.
///
/// # Errors
///
/// Returns [`OverrideError::Conflict`] if the store holds duplicate active
/// overrides, or [`OverrideError::Store`] if it cannot be read.
#[instrument(skip(store, identity))]
pub async fn resolve_effective_identity(
    store: &dyn OverrideStore,
    user: &PlatformUserId,
    identity: Option<&IdentityRecord>,
    community: &CommunityId,
) -> Result<EffectiveIdentity, OverrideError> {
    let active = store.active_for_user(user).await?;
    let (global, scoped) = select_layers(user, &active, community)?;
    Ok(merge_overrides(user, identity, global, scoped))
}

/// The effect an override change would have, computed without committing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePreview {
    pub before: EffectiveIdentity,
    pub after: EffectiveIdentity,
    pub roles_before: Vec<RoleRef>,
    pub roles_after: Vec<RoleRef>,
}

impl OverridePreview {
    /// Returns true if the change alters the matched roles.
    #[must_use]
    pub fn changes_roles(&self) -> bool {
        self.roles_before != self.roles_after
    }
}

/// Creates, deletes and previews overrides.
#[derive(Clone)]
pub struct OverrideService {
    overrides: Arc<dyn OverrideStore>,
    identities: Arc<dyn IdentityStore>,
    matcher: RoleMatcher,
}

impl OverrideService {
    #[must_use]
    pub fn new(
        overrides: Arc<dyn OverrideStore>,
        identities: Arc<dyn IdentityStore>,
        matcher: RoleMatcher,
    ) -> Self {
        Self {
            overrides,
            identities,
            matcher,
        }
    }

    /// Creates an override, retiring any active override for the same scope.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Empty`] without touching the store if the
    /// request sets no field, or a store error if it cannot be read or written.
    #[instrument(
        skip(self, request),
        fields(user = %request.target_user_id, scope = %request.scope)
    )]
    pub async fn create(
        &self,
        request: NewOverride,
        actor: &PlatformUserId,
    ) -> Result<OverrideRecord, OverrideError> {
        request.validate()?;
        let now = Utc::now();
        for mut existing in self.overrides.active_for_user(&request.target_user_id).await? {
            if existing.scope != request.scope {
                continue;
            }
            existing.state = OverrideState::Deleted {
                at: now,
                by: actor.clone(),
            };
            self.overrides.save(&existing).await?;
            info!(replaced = %existing.id, "retired previous override");
        }

        let record = request.into_record(actor.clone(), now);
        self.overrides.save(&record).await?;
        info!(id = %record.id, "override created");
        Ok(record)
    }

    /// Soft-deletes an override.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::NotFound`] or [`OverrideError::AlreadyDeleted`]
    /// if there is no active override with this id.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        id: &OverrideId,
        actor: &PlatformUserId,
    ) -> Result<OverrideRecord, OverrideError> {
        let mut record = self
            .overrides
            .get(id)
            .await?
            .ok_or_else(|| OverrideError::NotFound { id: *id })?;
        if !record.is_active() {
            return Err(OverrideError::AlreadyDeleted { id: *id });
        }
        record.state = OverrideState::Deleted {
            at: Utc::now(),
            by: actor.clone(),
        };
        self.overrides.save(&record).await?;
        info!("override deleted");
        Ok(record)
    }

    /// Previews creating an override in the context of one community.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores cannot be read or already conflict.
    pub async fn preview_create(
        &self,
        request: &NewOverride,
        community: &CommunityId,
        rule_set: Option<&RuleSet>,
    ) -> Result<OverridePreview, OverrideError> {
        request.validate()?;
        let user = request.target_user_id.clone();
        let draft = request.clone().into_record(user.clone(), Utc::now());
        self.preview(&user, community, rule_set, |active| {
            active.retain(|o| o.scope != draft.scope);
            active.push(draft);
        })
        .await
    }

    /// Previews deleting an override in the context of one community.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::NotFound`] if no active override has this id.
    pub async fn preview_delete(
        &self,
        id: &OverrideId,
        community: &CommunityId,
        rule_set: Option<&RuleSet>,
    ) -> Result<OverridePreview, OverrideError> {
        let record = self
            .overrides
            .get(id)
            .await?
            .filter(OverrideRecord::is_active)
            .ok_or_else(|| OverrideError::NotFound { id: *id })?;
        self.preview(&record.target_user_id, community, rule_set, |active| {
            active.retain(|o| o.id != record.id);
        })
        .await
    }

    async fn preview(
        &self,
        user: &PlatformUserId,
        community: &CommunityId,
        rule_set: Option<&RuleSet>,
        change: impl FnOnce(&mut Vec<OverrideRecord>),
    ) -> Result<OverridePreview, OverrideError> {
        let identity = self.identities.get(user).await?;
        let mut active = self.overrides.active_for_user(user).await?;

        let (global, scoped) = select_layers(user, &active, community)?;
        let before = merge_overrides(user, identity.as_ref(), global, scoped);

        change(&mut active);
        let (global, scoped) = select_layers(user, &active, community)?;
        let after = merge_overrides(user, identity.as_ref(), global, scoped);

        let roles_before = self.matcher.match_roles(Some(&before), rule_set, false).await?;
        let roles_after = self.matcher.match_roles(Some(&after), rule_set, false).await?;
        Ok(OverridePreview {
            before,
            after,
            roles_before,
            roles_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityUpdate;
    use crate::memory::{InMemoryIdentityStore, InMemoryOverrideStore};
    use crate::overlay::{CustomImportTable, Sha256Hasher};
    use crate::rules::{DepartmentMatch, Rule, YearMatch};
    use chrono::TimeZone;

    fn date(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 9, 1, 0, 0, 0).unwrap()
    }

    fn identity(department: Option<&str>, year: Option<i32>) -> IdentityRecord {
        let mut record = IdentityRecord::pending(PlatformUserId::new("u1"));
        record.apply(IdentityUpdate {
            external_id: Some(ExternalId::new("x1")),
            department: department.map(str::to_string),
            entrance_date: year.map(date),
            ..IdentityUpdate::default()
        });
        record
    }

    fn override_record(
        scope: OverrideScope,
        department: Option<&str>,
        year: Option<i32>,
    ) -> OverrideRecord {
        NewOverride {
            target_user_id: PlatformUserId::new("u1"),
            scope,
            department: department.map(str::to_string),
            entrance_date: year.map(date),
        }
        .into_record(PlatformUserId::new("admin"), Utc::now())
    }

    fn community() -> CommunityId {
        CommunityId::new("g1")
    }

    #[test]
    fn community_override_beats_global_beats_identity() {
        let identity = identity(Some("CS"), Some(2022));
        let global = override_record(OverrideScope::Global, Some("Math"), None);
        let scoped = override_record(OverrideScope::Community(community()), None, Some(2021));

        let effective = merge_overrides(
            identity.platform_user_id(),
            Some(&identity),
            Some(&global),
            Some(&scoped),
        );

        assert_eq!(effective.department.as_deref(), Some("Math"));
        assert_eq!(effective.entrance_year(), Some(2021));
        assert_eq!(effective.department_source, FieldSource::GlobalOverride);
        assert_eq!(effective.entrance_date_source, FieldSource::CommunityOverride);
        assert!(effective.verified);
    }

    #[test]
    fn community_field_overwrites_global_field() {
        let global = override_record(OverrideScope::Global, Some("Math"), Some(2018));
        let scoped = override_record(OverrideScope::Community(community()), Some("Physics"), None);

        let effective = merge_overrides(
            &PlatformUserId::new("u1"),
            None,
            Some(&global),
            Some(&scoped),
        );

        assert_eq!(effective.department.as_deref(), Some("Physics"));
        assert_eq!(effective.entrance_year(), Some(2018));
        assert!(effective.verified);
    }

    #[test]
    fn partial_identity_without_overrides_is_unverified() {
        let effective = merge_overrides(
            &PlatformUserId::new("u1"),
            Some(&identity(Some("CS"), None)),
            None,
            None,
        );
        assert!(!effective.verified);
        assert_eq!(effective.entrance_date_source, FieldSource::Absent);
        assert_eq!(effective.department_source, FieldSource::Identity);
    }

    #[test]
    fn override_promotes_partial_identity() {
        let partial = identity(Some("CS"), None);
        let global = override_record(OverrideScope::Global, None, Some(2020));

        let effective = merge_overrides(
            partial.platform_user_id(),
            Some(&partial),
            Some(&global),
            None,
        );

        assert!(effective.verified);
        assert_eq!(effective.department_source, FieldSource::Identity);
        assert_eq!(effective.entrance_date_source, FieldSource::GlobalOverride);
    }

    #[test]
    fn override_with_only_one_field_does_not_verify() {
        let global = override_record(OverrideScope::Global, Some("CS"), None);
        let effective = merge_overrides(&PlatformUserId::new("u1"), None, Some(&global), None);
        assert!(!effective.verified);
    }

    #[test]
    fn duplicate_active_overrides_conflict() {
        let overrides = vec![
            override_record(OverrideScope::Global, Some("A"), None),
            override_record(OverrideScope::Global, Some("B"), None),
        ];
        match select_layers(&PlatformUserId::new("u1"), &overrides, &community()) {
            Err(OverrideError::Conflict { scope, count, .. }) => {
                assert_eq!(scope, OverrideScope::Global);
                assert_eq!(count, 2);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn deleted_and_foreign_overrides_are_ignored() {
        let mut deleted = override_record(OverrideScope::Global, Some("Old"), None);
        deleted.state = OverrideState::Deleted {
            at: Utc::now(),
            by: PlatformUserId::new("admin"),
        };
        let other_community =
            override_record(OverrideScope::Community(CommunityId::new("g2")), Some("X"), None);
        let active = override_record(OverrideScope::Global, Some("New"), None);
        let overrides = vec![deleted, other_community, active];

        let (global, scoped) =
            select_layers(&PlatformUserId::new("u1"), &overrides, &community()).unwrap();
        assert_eq!(global.and_then(|o| o.department.as_deref()), Some("New"));
        assert!(scoped.is_none());
    }

    #[test]
    fn override_record_serializes_scope_and_state() {
        let record = override_record(OverrideScope::Community(community()), Some("CS"), None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["scope"], "COMMUNITY");
        assert_eq!(json["communityId"], "g1");
        assert_eq!(json["state"], "active");
    }

    fn service() -> (OverrideService, Arc<InMemoryOverrideStore>, Arc<InMemoryIdentityStore>) {
        let overrides = Arc::new(InMemoryOverrideStore::new());
        let identities = Arc::new(InMemoryIdentityStore::new());
        let matcher = RoleMatcher::new(
            Arc::new(CustomImportTable::default()),
            Arc::new(Sha256Hasher),
        );
        (
            OverrideService::new(overrides.clone(), identities.clone(), matcher),
            overrides,
            identities,
        )
    }

    #[tokio::test]
    async fn create_retires_previous_override_for_same_scope() {
        let (service, store, _) = service();
        let admin = PlatformUserId::new("admin");
        let request = |dept: &str| NewOverride {
            target_user_id: PlatformUserId::new("u1"),
            scope: OverrideScope::Global,
            department: Some(dept.to_string()),
            entrance_date: None,
        };

        let first = service.create(request("A"), &admin).await.unwrap();
        let second = service.create(request("B"), &admin).await.unwrap();

        let active = store.active_for_user(&PlatformUserId::new("u1")).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        let retired = store.get(&first.id).await.unwrap().unwrap();
        match retired.state {
            OverrideState::Deleted { by, .. } => assert_eq!(by, admin),
            OverrideState::Active => panic!("previous override should be retired"),
        }
    }

    #[tokio::test]
    async fn create_rejects_override_without_fields() {
        let (service, store, _) = service();
        let admin = PlatformUserId::new("admin");
        let existing = service
            .create(
                NewOverride {
                    target_user_id: PlatformUserId::new("u1"),
                    scope: OverrideScope::Global,
                    department: Some("CS".to_string()),
                    entrance_date: None,
                },
                &admin,
            )
            .await
            .unwrap();

        let empty = NewOverride {
            target_user_id: PlatformUserId::new("u1"),
            scope: OverrideScope::Global,
            department: None,
            entrance_date: None,
        };
        let err = service.create(empty.clone(), &admin).await.unwrap_err();
        assert_eq!(
            err,
            OverrideError::Empty {
                user: PlatformUserId::new("u1")
            }
        );
        assert!(matches!(
            service.preview_create(&empty, &community(), None).await,
            Err(OverrideError::Empty { .. })
        ));

        let active = store.active_for_user(&PlatformUserId::new("u1")).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, existing.id);
    }

    #[tokio::test]
    async fn delete_is_soft_and_not_repeatable() {
        let (service, store, _) = service();
        let admin = PlatformUserId::new("admin");
        let created = service
            .create(
                NewOverride {
                    target_user_id: PlatformUserId::new("u1"),
                    scope: OverrideScope::Community(community()),
                    department: None,
                    entrance_date: Some(date(2019)),
                },
                &admin,
            )
            .await
            .unwrap();

        service.delete(&created.id, &admin).await.unwrap();
        assert!(store.get(&created.id).await.unwrap().is_some());
        assert!(
            store
                .active_for_user(&PlatformUserId::new("u1"))
                .await
                .unwrap()
                .is_empty()
        );

        assert_eq!(
            service.delete(&created.id, &admin).await,
            Err(OverrideError::AlreadyDeleted { id: created.id })
        );
    }

    #[tokio::test]
    async fn resolve_reports_store_conflict() {
        let (_, store, _) = service();
        store
            .save(&override_record(OverrideScope::Global, Some("A"), None))
            .await
            .unwrap();
        store
            .save(&override_record(OverrideScope::Global, Some("B"), None))
            .await
            .unwrap();

        let result = resolve_effective_identity(
            store.as_ref(),
            &PlatformUserId::new("u1"),
            None,
            &community(),
        )
        .await;
        assert!(matches!(result, Err(OverrideError::Conflict { .. })));
    }

    #[tokio::test]
    async fn preview_create_shows_role_change_without_committing() {
        let (service, store, identities) = service();
        identities.save(&identity(Some("CS"), Some(2022))).await.unwrap();
        let rules = RuleSet::new(vec![
            Rule::department(vec![RoleRef::new("m", "Math")], "Math", DepartmentMatch::Exact),
            Rule::department(vec![RoleRef::new("c", "CS")], "CS", DepartmentMatch::Exact)
                .with_year(YearMatch::Equal, Some(2022)),
        ]);
        let request = NewOverride {
            target_user_id: PlatformUserId::new("u1"),
            scope: OverrideScope::Community(community()),
            department: Some("Math".to_string()),
            entrance_date: None,
        };

        let preview = service
            .preview_create(&request, &community(), Some(&rules))
            .await
            .unwrap();

        assert!(preview.changes_roles());
        assert_eq!(preview.roles_before[0].name, "CS");
        assert_eq!(preview.roles_after[0].name, "Math");
        assert!(
            store
                .active_for_user(&PlatformUserId::new("u1"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn preview_delete_reverts_to_identity() {
        let (service, _, identities) = service();
        identities.save(&identity(Some("CS"), Some(2022))).await.unwrap();
        let created = service
            .create(
                NewOverride {
                    target_user_id: PlatformUserId::new("u1"),
                    scope: OverrideScope::Global,
                    department: Some("Math".to_string()),
                    entrance_date: None,
                },
                &PlatformUserId::new("admin"),
            )
            .await
            .unwrap();

        let preview = service
            .preview_delete(&created.id, &community(), None)
            .await
            .unwrap();
        assert_eq!(preview.before.department.as_deref(), Some("Math"));
        assert_eq!(preview.after.department.as_deref(), Some("CS"));
        assert!(!preview.changes_roles());
    }
}
