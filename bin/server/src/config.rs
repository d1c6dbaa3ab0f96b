//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! See [`OidcConfig`](campus_gate_identity::OidcConfig) for the identity
//! provider configuration.

use campus_gate_identity::OidcConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Institutional identity provider configuration.
    pub oidc: OidcConfig,

    /// Verification link handling.
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Optional custom import document loaded into the overlay at startup.
    #[serde(default)]
    pub custom_import_file: Option<String>,
}

/// Verification link handling.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// How long the login state cookie stays valid, in minutes.
    #[serde(default = "default_auth_state_minutes")]
    pub auth_state_minutes: i64,

    /// Interval between expired request cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_auth_state_minutes() -> i64 {
    10
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            auth_state_minutes: default_auth_state_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Nested keys use `__`, e.g. `OIDC__ISSUER_URL`.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_config_has_correct_defaults() {
        let config = VerificationConfig::default();
        assert_eq!(config.auth_state_minutes, 10);
        assert_eq!(config.cleanup_interval_seconds, 300);
        assert!(config.secure_cookies);
    }

    #[test]
    fn server_config_fills_defaults() {
        let json = r#"{
            "database_url": "postgres://localhost/campus_gate",
            "oidc": {
                "issuer_url": "https://sso.example.edu",
                "client_id": "campus-gate",
                "client_secret": "secret",
                "redirect_uri": "https://verify.example.edu/auth/callback"
            }
        }"#;

        let config: ServerConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert!(config.custom_import_file.is_none());
        assert!(config.verification.secure_cookies);
        assert_eq!(config.oidc.department_claim(), "department");
    }
}
