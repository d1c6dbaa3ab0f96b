//! Rule matching.
//!
//! Maps an effective identity to the roles of the first rule it satisfies.

use crate::error::StoreError;
use crate::overlay::{CustomImportEntry, CustomImportOverlay, IdentityHasher};
use crate::overrides::EffectiveIdentity;
use crate::rules::{DepartmentMatch, RoleRef, Rule, RuleSet, YearMatch};
use std::sync::Arc;
use tracing::{instrument, trace, warn};

/// Returns the roles of the first rule matching `identity`.
///
/// Returns an empty list if the identity is absent or not verified, if it
/// lacks a department or entrance year, if there are no rules, or if no
/// rule matches. Deciding on fallback roles is up to the caller.
#[must_use]
pub fn match_roles(
    identity: Option<&EffectiveIdentity>,
    rule_set: Option<&RuleSet>,
    overlay: Option<&CustomImportEntry>,
) -> Vec<RoleRef> {
    let Some(identity) = identity.filter(|i| i.verified) else {
        return Vec::new();
    };
    let (Some(department), Some(identity_year)) =
        (identity.department.as_deref(), identity.entrance_year())
    else {
        return Vec::new();
    };
    let Some(rule_set) = rule_set.filter(|set| !set.rules.is_empty()) else {
        return Vec::new();
    };

    let mut departments = vec![department.to_lowercase()];
    let mut year = identity_year;
    if let Some(entry) = overlay {
        departments.extend(entry.departments.iter().map(|d| d.to_lowercase()));
        if let Some(imported) = entry.entrance_year {
            year = imported;
        }
    }

    for (index, rule) in rule_set.rules.iter().enumerate() {
        if !department_matches(rule, &departments) {
            continue;
        }
        match year_matches(rule, year, rule_set.base_year) {
            Some(true) => {
                trace!(rule = index, "rule matched");
                return rule.roles.clone();
            }
            Some(false) => {}
            None => warn!(rule = index, "rule compares years but has no target year, skipping"),
        }
    }
    Vec::new()
}

fn department_matches(rule: &Rule, candidates: &[String]) -> bool {
    let wanted = rule.department.to_lowercase();
    match rule.department_match_type {
        DepartmentMatch::Anything => true,
        DepartmentMatch::Exact => candidates.iter().any(|d| *d == wanted),
        DepartmentMatch::Begins => candidates.iter().any(|d| d.starts_with(&wanted)),
        DepartmentMatch::Contains => candidates.iter().any(|d| d.contains(&wanted)),
    }
}

/// `None` when the rule needs a target year and has none.
fn year_matches(rule: &Rule, year: i32, base_year: Option<i32>) -> Option<bool> {
    if rule.year_match_type == YearMatch::All {
        return Some(true);
    }
    let target = rule.target_year(base_year)?;
    Some(match rule.year_match_type {
        YearMatch::All => true,
        YearMatch::Equal => year == target,
        YearMatch::Upper => year < target,
        YearMatch::Lower => year > target,
    })
}

/// Rule matching with custom import lookups.
#[derive(Clone)]
pub struct RoleMatcher {
    overlay: Arc<dyn CustomImportOverlay>,
    hasher: Arc<dyn IdentityHasher>,
}

impl RoleMatcher {
    #[must_use]
    pub fn new(overlay: Arc<dyn CustomImportOverlay>, hasher: Arc<dyn IdentityHasher>) -> Self {
        Self { overlay, hasher }
    }

    /// Matches roles, consulting the custom import overlay unless skipped.
    ///
    /// Identities without an institutional key have no overlay entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the overlay cannot be read.
    #[instrument(skip_all, fields(skip_custom_import = skip_custom_import))]
    pub async fn match_roles(
        &self,
        identity: Option<&EffectiveIdentity>,
        rule_set: Option<&RuleSet>,
        skip_custom_import: bool,
    ) -> Result<Vec<RoleRef>, StoreError> {
        let key = identity
            .filter(|_| !skip_custom_import)
            .filter(|i| i.verified)
            .and_then(|i| i.external_id.as_ref());
        let entry = match key {
            Some(external_id) => {
                self.overlay
                    .lookup(&self.hasher.hash(external_id.as_str()))
                    .await?
            }
            None => None,
        };
        Ok(match_roles(identity, rule_set, entry.as_ref()))
    }
}
