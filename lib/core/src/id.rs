//! Strongly-typed ID types for domain entities.
//!
//! Records owned by campus-gate (overrides, ban records) use ULID
//! identifiers, providing both uniqueness and temporal ordering.
//! Identifiers owned by the chat platform or the identity provider are
//! opaque strings wrapped in their own types so they cannot be mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Try with prefix first
                let prefix_with_underscore = concat!($prefix, "_");
                let ulid_str = if let Some(stripped) = s.strip_prefix(prefix_with_underscore) {
                    stripped
                } else {
                    // Try parsing as raw ULID
                    s
                };

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for an identity override record.
    OverrideId,
    "ovr"
);

define_id!(
    /// Unique identifier for a persisted community ban record.
    BanRecordId,
    "ban"
);

/// Macro to generate a strongly-typed wrapper around an externally issued string key.
macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw key.
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Returns the raw key.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper, returning the raw key.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key!(
    /// Chat-platform identifier of a community (guild).
    CommunityId
);

define_key!(
    /// Chat-platform identifier of a user account.
    PlatformUserId
);

define_key!(
    /// Chat-platform identifier of a role.
    RoleId
);

define_key!(
    /// Institutional identity key issued by the identity provider.
    ///
    /// One person may link several platform accounts to the same key.
    ExternalId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_id_display_format() {
        let id = OverrideId::new();
        assert!(id.to_string().starts_with("ovr_"));
    }

    #[test]
    fn ban_record_id_display_format() {
        let id = BanRecordId::new();
        assert!(id.to_string().starts_with("ban_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = OverrideId::new();
        let parsed: OverrideId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: BanRecordId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_invalid_ulid() {
        let result: Result<OverrideId, _> = "not_a_ulid".parse();
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "OverrideId");
    }

    #[test]
    fn key_displays_raw_value() {
        let id = PlatformUserId::new("184405311681986560");
        assert_eq!(id.to_string(), "184405311681986560");
        assert_eq!(id.as_str(), "184405311681986560");
    }

    #[test]
    fn keys_of_equal_value_hash_together() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(RoleId::from("1"));
        set.insert(RoleId::from("2".to_string()));
        set.insert(RoleId::new("1"));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn key_serializes_transparently() {
        let id = ExternalId::new("j2smith");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"j2smith\"");
        let parsed: ExternalId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
