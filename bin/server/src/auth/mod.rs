//! Verification web flow for the campus-gate server.
//!
//! This module provides:
//! - OIDC authentication with the institutional identity provider
//! - The routes a verification link leads through
//!
//! A member receives a link carrying a pending request token. Opening it
//! redirects to the institution's login; the callback writes the identity
//! record for the member the link was issued to and consumes the request.
//! Role assignment itself happens in the bot, which reconciles the member
//! once the record exists.

pub mod oidc;
pub mod routes;

use crate::config::VerificationConfig;
use crate::db::Stores;

pub use oidc::OidcClient;
pub use routes::{callback, health, verify};

/// Shared application state.
pub struct AppState {
    /// Database repositories.
    pub stores: Stores,
    /// OIDC client for the institutional provider.
    pub oidc_client: OidcClient,
    /// Verification link configuration.
    pub verification: VerificationConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(stores: Stores, oidc_client: OidcClient, verification: VerificationConfig) -> Self {
        Self {
            stores,
            oidc_client,
            verification,
        }
    }
}
