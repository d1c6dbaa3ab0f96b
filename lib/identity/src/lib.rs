//! Institutional identity verification for campus-gate.
//!
//! This crate provides:
//! - Identity provider configuration with configurable claim names (`OidcConfig`)
//! - ID token claim mapping into an identity update (`identity_from_claims`)
//! - Verification links issued to members (`PendingVerification`, `PendingStore`)
//! - Completing a verification into an identity record (`complete_verification`)
//!
//! # Example
//!
//! ```
//! use campus_gate_identity::{OidcConfig, identity_from_claims};
//!
//! let config = OidcConfig::new(
//!     "https://sso.example.edu".to_string(),
//!     "campus-gate".to_string(),
//!     "secret".to_string(),
//!     "https://verify.example.edu/auth/callback".to_string(),
//! );
//! let claims = serde_json::json!({
//!     "sub": "j2smith",
//!     "department": "VPA/Software Engineering",
//!     "entrance_date": 2022,
//! });
//!
//! let update = identity_from_claims(&claims, &config).unwrap();
//! assert_eq!(update.department.as_deref(), Some("VPA/Software Engineering"));
//! ```

pub mod claims;
pub mod error;
pub mod memory;
pub mod oidc;
pub mod pending;

// Re-export main types at crate root
pub use claims::{decode_jwt_payload, identity_from_claims};
pub use error::AuthenticationError;
pub use memory::InMemoryPendingStore;
pub use oidc::{OidcConfig, OidcConfigBuilder};
pub use pending::{
    PendingStore, PendingVerification, VerificationToken, begin_verification,
    complete_verification, open_verification,
};
