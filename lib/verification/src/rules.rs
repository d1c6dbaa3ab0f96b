//! Rule sets mapping identity attributes to roles.
//!
//! A community owns one ordered [`RuleSet`]. Each [`Rule`] pairs a
//! department predicate with an entrance-year predicate; the first rule
//! whose predicates both hold decides the roles a user receives.

use crate::error::RuleValidationError;
use crate::platform::PlatformRole;
use campus_gate_core::RoleId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Pointer to a platform role.
///
/// The id is authoritative; the name is cached for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleRef {
    pub id: RoleId,
    pub name: String,
}

impl RoleRef {
    #[must_use]
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// How a rule's department string is compared with a user's departments.
///
/// Comparison is case-insensitive and never trims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepartmentMatch {
    /// Any department matches, including none at all.
    Anything,
    /// A department equals the rule's department.
    Exact,
    /// A department starts with the rule's department.
    Begins,
    /// A department contains the rule's department.
    Contains,
}

impl DepartmentMatch {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anything => "anything",
            Self::Exact => "exact",
            Self::Begins => "begins",
            Self::Contains => "contains",
        }
    }
}

impl fmt::Display for DepartmentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepartmentMatch {
    type Err = RuleValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anything" => Ok(Self::Anything),
            "exact" => Ok(Self::Exact),
            "begins" => Ok(Self::Begins),
            "contains" => Ok(Self::Contains),
            other => Err(RuleValidationError::UnknownDepartmentMatch {
                value: other.to_string(),
            }),
        }
    }
}

/// How a user's entrance year is compared with a rule's year.
///
/// `Upper` selects students who entered *before* the target year (upper
/// years); `Lower` selects those who entered *after* it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearMatch {
    /// Any entrance year matches.
    All,
    /// Entrance year equals the target year.
    Equal,
    /// Entrance year is earlier than the target year.
    Upper,
    /// Entrance year is later than the target year.
    Lower,
}

impl YearMatch {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Equal => "equal",
            Self::Upper => "upper",
            Self::Lower => "lower",
        }
    }

    /// Returns true if this match type needs a target year.
    #[must_use]
    pub fn needs_year(&self) -> bool {
        !matches!(self, Self::All)
    }
}

impl fmt::Display for YearMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for YearMatch {
    type Err = RuleValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "equal" => Ok(Self::Equal),
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            other => Err(RuleValidationError::UnknownYearMatch {
                value: other.to_string(),
            }),
        }
    }
}

/// One matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Roles granted when the rule fires. Never empty in a validated set.
    pub roles: Vec<RoleRef>,
    pub department: String,
    pub department_match_type: DepartmentMatch,
    pub year_match_type: YearMatch,
    /// Target year; falls back to the rule set's base year when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl Rule {
    /// Creates a rule that matches every department and every year.
    #[must_use]
    pub fn anyone(roles: Vec<RoleRef>) -> Self {
        Self {
            roles,
            department: String::new(),
            department_match_type: DepartmentMatch::Anything,
            year_match_type: YearMatch::All,
            year: None,
        }
    }

    /// Creates a rule matching a department, for every year.
    #[must_use]
    pub fn department(
        roles: Vec<RoleRef>,
        department: impl Into<String>,
        match_type: DepartmentMatch,
    ) -> Self {
        Self {
            roles,
            department: department.into(),
            department_match_type: match_type,
            year_match_type: YearMatch::All,
            year: None,
        }
    }

    /// Restricts the rule to an entrance-year comparison.
    #[must_use]
    pub fn with_year(mut self, match_type: YearMatch, year: Option<i32>) -> Self {
        self.year_match_type = match_type;
        self.year = year;
        self
    }

    /// Returns the year this rule compares against, if any.
    #[must_use]
    pub fn target_year(&self, base_year: Option<i32>) -> Option<i32> {
        self.year.or(base_year)
    }

    /// Checks the rule in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule grants no roles or compares years
    /// without a year to compare against.
    pub fn validate(
        &self,
        index: usize,
        base_year: Option<i32>,
    ) -> Result<(), RuleValidationError> {
        if self.roles.is_empty() {
            return Err(RuleValidationError::EmptyRoles { rule_index: index });
        }
        if self.year_match_type.needs_year() && self.target_year(base_year).is_none() {
            return Err(RuleValidationError::MissingYear { rule_index: index });
        }
        Ok(())
    }
}

/// A community's ordered rules plus the fallback roles for unmatched users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    /// Evaluated in order; the first match wins.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Granted to members no rule matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unverified_roles: Option<Vec<RoleRef>>,
    /// Deprecated community-wide default year, still honored for old configurations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_year: Option<i32>,
}

impl RuleSet {
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            unverified_roles: None,
            base_year: None,
        }
    }

    #[must_use]
    pub fn with_unverified_roles(mut self, roles: Vec<RoleRef>) -> Self {
        self.unverified_roles = Some(roles);
        self
    }

    #[must_use]
    pub fn with_base_year(mut self, year: i32) -> Self {
        self.base_year = Some(year);
        self
    }

    /// Validates every rule. Called before a rule set is stored.
    ///
    /// # Errors
    ///
    /// Returns the first rule that fails validation.
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        self.rules
            .iter()
            .enumerate()
            .try_for_each(|(index, rule)| rule.validate(index, self.base_year))
    }

    /// Returns the fallback roles, if any are configured.
    #[must_use]
    pub fn fallback_roles(&self) -> Option<&[RoleRef]> {
        let roles = self.unverified_roles.as_deref()?;
        (!roles.is_empty()).then_some(roles)
    }

    /// Returns every role id this rule set may grant.
    ///
    /// Reconciliation only ever removes roles in this set.
    #[must_use]
    pub fn managed_role_ids(&self) -> HashSet<RoleId> {
        self.rules
            .iter()
            .flat_map(|rule| rule.roles.iter())
            .chain(self.unverified_roles.iter().flatten())
            .map(|role| role.id.clone())
            .collect()
    }

    /// Refreshes cached role names from the platform's current roles.
    ///
    /// Returns how many role references were renamed.
    pub fn sync_role_names(&mut self, platform_roles: &[PlatformRole]) -> usize {
        let mut renamed = 0;
        let refs = self
            .rules
            .iter_mut()
            .flat_map(|rule| rule.roles.iter_mut())
            .chain(self.unverified_roles.iter_mut().flatten());
        for role in refs {
            let Some(current) = platform_roles.iter().find(|r| r.id == role.id) else {
                continue;
            };
            if current.name != role.name {
                role.name.clone_from(&current.name);
                renamed += 1;
            }
        }
        renamed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: &str) -> RoleRef {
        RoleRef::new(id, format!("role-{id}"))
    }

    #[test]
    fn match_types_parse_and_reject_unknown() {
        assert_eq!("begins".parse::<DepartmentMatch>().unwrap(), DepartmentMatch::Begins);
        assert_eq!("upper".parse::<YearMatch>().unwrap(), YearMatch::Upper);

        match "startswith".parse::<DepartmentMatch>() {
            Err(RuleValidationError::UnknownDepartmentMatch { value }) => {
                assert_eq!(value, "startswith");
            }
            other => panic!("expected unknown match type, got {other:?}"),
        }
        assert!("older".parse::<YearMatch>().is_err());
    }

    #[test]
    fn deserializing_unknown_match_type_fails() {
        let json = r#"{
            "roles": [{"id": "1", "name": "cs"}],
            "department": "CS",
            "departmentMatchType": "fuzzy",
            "yearMatchType": "all"
        }"#;
        assert!(serde_json::from_str::<Rule>(json).is_err());
    }

    #[test]
    fn rule_set_deserializes_stored_shape() {
        let json = r#"{
            "rules": [{
                "roles": [{"id": "10", "name": "Engineering"}],
                "department": "VPA/",
                "departmentMatchType": "begins",
                "yearMatchType": "upper",
                "year": 2020
            }],
            "unverifiedRoles": [{"id": "99", "name": "Unverified"}],
            "baseYear": 2018
        }"#;
        let set: RuleSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rules[0].department_match_type, DepartmentMatch::Begins);
        assert_eq!(set.rules[0].year, Some(2020));
        assert_eq!(set.base_year, Some(2018));
        assert!(set.validate().is_ok());
    }

    #[test]
    fn empty_roles_rejected() {
        let set = RuleSet::new(vec![Rule::anyone(vec![role("1")]), Rule::anyone(vec![])]);
        assert_eq!(
            set.validate(),
            Err(RuleValidationError::EmptyRoles { rule_index: 1 })
        );
    }

    #[test]
    fn year_comparison_needs_year_or_base_year() {
        let rule = Rule::anyone(vec![role("1")]).with_year(YearMatch::Equal, None);
        let set = RuleSet::new(vec![rule.clone()]);
        assert_eq!(
            set.validate(),
            Err(RuleValidationError::MissingYear { rule_index: 0 })
        );

        let with_base = RuleSet::new(vec![rule]).with_base_year(2021);
        assert!(with_base.validate().is_ok());
    }

    #[test]
    fn managed_roles_include_fallback() {
        let set = RuleSet::new(vec![
            Rule::anyone(vec![role("1"), role("2")]),
            Rule::department(vec![role("2"), role("3")], "CS", DepartmentMatch::Exact),
        ])
        .with_unverified_roles(vec![role("9")]);

        let managed = set.managed_role_ids();
        assert_eq!(managed.len(), 4);
        assert!(managed.contains(&RoleId::new("9")));
    }

    #[test]
    fn empty_fallback_is_treated_as_absent() {
        let set = RuleSet::new(vec![]).with_unverified_roles(vec![]);
        assert!(set.fallback_roles().is_none());
    }

    #[test]
    fn sync_role_names_renames_changed_roles() {
        let mut set = RuleSet::new(vec![Rule::anyone(vec![role("1"), role("2")])])
            .with_unverified_roles(vec![role("1")]);
        let platform = vec![
            PlatformRole::new("1", "Freshly Renamed", 3),
            PlatformRole::new("2", "role-2", 4),
        ];

        assert_eq!(set.sync_role_names(&platform), 2);
        assert_eq!(set.rules[0].roles[0].name, "Freshly Renamed");
        assert_eq!(set.rules[0].roles[1].name, "role-2");
        assert_eq!(set.fallback_roles().unwrap()[0].name, "Freshly Renamed");
        assert_eq!(set.sync_role_names(&platform), 0);
    }
}
