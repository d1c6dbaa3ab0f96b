//! Role assignment and verification engine for campus-gate.
//!
//! This crate turns verified institutional identities into chat-platform
//! roles:
//! - Identity records written by the OAuth flow (`IdentityRecord`, `upsert_identity`)
//! - Staff overrides and their precedence (`OverrideService`, `resolve_effective_identity`)
//! - Ordered community rule sets and the first-match-wins matcher (`RuleSet`, `match_roles`)
//! - The custom import overlay keyed by hashed identity (`CustomImportOverlay`)
//! - Per-member and community-wide reconciliation (`Reconciler`, `BulkReconciler`)
//! - Bans that follow a person across linked accounts (`BanService`)
//!
//! Storage and the chat platform are reached only through the traits in
//! [`identity`], [`overrides`], [`ban`], [`community`], [`overlay`] and
//! [`platform`]. The [`memory`] module implements all of them in process.

pub mod ban;
pub mod bulk;
pub mod community;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod memory;
pub mod overlay;
pub mod overrides;
pub mod platform;
pub mod reconcile;
pub mod rules;

// Re-export main types at crate root
pub use ban::{BanKey, BanOutcome, BanRecord, BanService, BanState, BanStore, find_active_ban};
pub use bulk::{BulkReconciler, BulkSummary};
pub use community::{
    CachedConfig, CommunityConfig, ConfigCache, ConfigSource, NicknameMode, NicknamePolicy,
    save_config,
};
pub use error::{
    BanError, BulkError, ConfigError, OverrideError, PlatformError, ReconcileError,
    RuleValidationError, StoreError,
};
pub use identity::{IdentityRecord, IdentityStore, IdentityUpdate, upsert_identity};
pub use matcher::{RoleMatcher, match_roles};
pub use overlay::{
    CustomImportEntry, CustomImportOverlay, CustomImportTable, IdentityHasher, Sha256Hasher,
    parse_import,
};
pub use overrides::{
    EffectiveIdentity, FieldSource, NewOverride, OverridePreview, OverrideRecord, OverrideScope,
    OverrideService, OverrideState, OverrideStore, resolve_effective_identity,
};
pub use platform::{BotCapability, Member, Platform, PlatformRole};
pub use reconcile::{
    Collaborators, NameUpdate, ReconcileOptions, ReconcileOutcome, Reconciler, SkipReason,
    SkippedRole,
};
pub use rules::{DepartmentMatch, RoleRef, Rule, RuleSet, YearMatch};
