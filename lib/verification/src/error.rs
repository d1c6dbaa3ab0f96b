//! Error types for the verification crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`, `PlatformError`: failures reported by collaborators
//! - `RuleValidationError`, `ConfigError`: rule sets rejected at configuration time
//! - `OverrideError`: override store writes and consistency checks
//! - `ReconcileError`: outcome of a single user's reconciliation
//! - `BanError`: ban and unban propagation
//! - `BulkError`: failures that stop a community-wide run

use crate::overrides::OverrideScope;
use campus_gate_core::{CommunityId, OverrideId, PlatformUserId};
use std::fmt;

/// Errors from the document store collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the query failed.
    Unavailable { reason: String },
    /// A stored document could not be decoded.
    Corrupt { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "store unavailable: {reason}"),
            Self::Corrupt { reason } => write!(f, "corrupt stored record: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the chat-platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The call failed or timed out after the platform client's own retries.
    Unavailable { reason: String },
    /// The platform refused the action.
    Forbidden { action: String },
    /// The referenced member, role or community does not exist.
    NotFound { what: String },
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "platform unavailable: {reason}"),
            Self::Forbidden { action } => write!(f, "platform refused to {action}"),
            Self::NotFound { what } => write!(f, "platform object not found: {what}"),
        }
    }
}

impl std::error::Error for PlatformError {}

/// Errors raised while validating a rule set before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleValidationError {
    /// A rule grants no roles.
    EmptyRoles { rule_index: usize },
    /// A rule compares years but neither it nor the rule set names one.
    MissingYear { rule_index: usize },
    /// Unrecognized department match type.
    UnknownDepartmentMatch { value: String },
    /// Unrecognized year match type.
    UnknownYearMatch { value: String },
}

impl fmt::Display for RuleValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRoles { rule_index } => {
                write!(f, "rule {rule_index} does not grant any roles")
            }
            Self::MissingYear { rule_index } => {
                write!(
                    f,
                    "rule {rule_index} compares entrance years but has no year and no base year is set"
                )
            }
            Self::UnknownDepartmentMatch { value } => {
                write!(f, "unknown department match type '{value}'")
            }
            Self::UnknownYearMatch { value } => {
                write!(f, "unknown year match type '{value}'")
            }
        }
    }
}

impl std::error::Error for RuleValidationError {}

/// Errors from writing a community configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The rule set failed validation and was not stored.
    Invalid(RuleValidationError),
    /// The configuration store failed.
    Store(StoreError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "invalid rule set: {err}"),
            Self::Store(err) => write!(f, "configuration store error: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<RuleValidationError> for ConfigError {
    fn from(err: RuleValidationError) -> Self {
        Self::Invalid(err)
    }
}

impl From<StoreError> for ConfigError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Errors from override operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideError {
    /// More than one active override exists for the same scope.
    Conflict {
        user: PlatformUserId,
        scope: OverrideScope,
        count: usize,
    },
    /// No override with this id exists.
    NotFound { id: OverrideId },
    /// The override was already soft-deleted.
    AlreadyDeleted { id: OverrideId },
    /// The override sets neither a department nor an entrance date.
    Empty { user: PlatformUserId },
    /// The override store failed.
    Store(StoreError),
}

impl fmt::Display for OverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { user, scope, count } => {
                write!(
                    f,
                    "found {count} active {scope} overrides for user {user}, expected at most one"
                )
            }
            Self::NotFound { id } => write!(f, "override not found: {id}"),
            Self::AlreadyDeleted { id } => write!(f, "override already deleted: {id}"),
            Self::Empty { user } => {
                write!(f, "override for user {user} sets neither department nor entrance date")
            }
            Self::Store(err) => write!(f, "override store error: {err}"),
        }
    }
}

impl std::error::Error for OverrideError {}

impl From<StoreError> for OverrideError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Errors and terminal outcomes of a single reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// The user (or an account linked to the same identity) is banned.
    Banned { key: String },
    /// A platform read or write failed; the reconciliation was abandoned.
    PlatformUnavailable { reason: String },
    /// The override store holds more than one active override for a scope.
    Conflict {
        user: PlatformUserId,
        scope: OverrideScope,
    },
    /// A store read failed.
    Store { reason: String },
}

impl ReconcileError {
    /// Returns the diagnostic shown to the person who triggered the reconciliation.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Banned { .. } => "You are banned from this server.",
            Self::PlatformUnavailable { .. } | Self::Store { .. } => {
                "Something went wrong while updating your roles. Please try again later."
            }
            Self::Conflict { .. } => {
                "Your verification data needs attention from the server staff."
            }
        }
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Banned { key } => write!(f, "banned (identity key {key})"),
            Self::PlatformUnavailable { reason } => {
                write!(f, "platform unavailable: {reason}")
            }
            Self::Conflict { user, scope } => {
                write!(f, "conflicting active {scope} overrides for user {user}")
            }
            Self::Store { reason } => write!(f, "store error: {reason}"),
        }
    }
}

impl std::error::Error for ReconcileError {}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        Self::Store {
            reason: err.to_string(),
        }
    }
}

impl From<PlatformError> for ReconcileError {
    fn from(err: PlatformError) -> Self {
        Self::PlatformUnavailable {
            reason: err.to_string(),
        }
    }
}

impl From<OverrideError> for ReconcileError {
    fn from(err: OverrideError) -> Self {
        match err {
            OverrideError::Conflict { user, scope, .. } => Self::Conflict { user, scope },
            other => Self::Store {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors from ban and unban propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanError {
    /// No active ban covers the user.
    NotBanned { user: PlatformUserId },
    /// Banning or unbanning the originating account failed.
    PlatformUnavailable { reason: String },
    /// The ban list or identity store failed.
    Store(StoreError),
}

impl fmt::Display for BanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotBanned { user } => write!(f, "user {user} is not banned"),
            Self::PlatformUnavailable { reason } => {
                write!(f, "platform unavailable: {reason}")
            }
            Self::Store(err) => write!(f, "ban store error: {err}"),
        }
    }
}

impl std::error::Error for BanError {}

impl From<StoreError> for BanError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Errors that stop a community-wide reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkError {
    /// The member list could not be fetched.
    MemberListUnavailable {
        community: CommunityId,
        reason: String,
    },
    /// Community configuration could not be loaded.
    ConfigUnavailable {
        community: CommunityId,
        reason: String,
    },
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemberListUnavailable { community, reason } => {
                write!(f, "could not list members of {community}: {reason}")
            }
            Self::ConfigUnavailable { community, reason } => {
                write!(f, "could not load configuration of {community}: {reason}")
            }
        }
    }
}

impl std::error::Error for BulkError {}
