//! Institutional identity provider configuration.
//!
//! Universities name their claims differently, so every claim the
//! verification flow reads is configurable.

use serde::{Deserialize, Serialize};

/// Configuration for the institutional OIDC provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The OIDC issuer URL. Used for discovery.
    issuer_url: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The redirect URI for the OAuth2 callback (e.g., "https://verify.example.edu/auth/callback").
    redirect_uri: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,profile"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Claim holding the institutional identity key.
    /// Default: "sub"
    #[serde(default = "default_external_id_claim")]
    external_id_claim: String,
    /// Claim holding the department (a string or a list of strings).
    /// Default: "department"
    #[serde(default = "default_department_claim")]
    department_claim: String,
    /// Claim holding the entrance date or entrance year.
    /// Default: "entrance_date"
    #[serde(default = "default_entrance_date_claim")]
    entrance_date_claim: String,
    /// Default: "name"
    #[serde(default = "default_display_name_claim")]
    display_name_claim: String,
    /// Default: "given_name"
    #[serde(default = "default_given_name_claim")]
    given_name_claim: String,
}

fn default_scopes() -> String {
    "openid,profile".to_string()
}

fn default_external_id_claim() -> String {
    "sub".to_string()
}

fn default_department_claim() -> String {
    "department".to_string()
}

fn default_entrance_date_claim() -> String {
    "entrance_date".to_string()
}

fn default_display_name_claim() -> String {
    "name".to_string()
}

fn default_given_name_claim() -> String {
    "given_name".to_string()
}

impl OidcConfig {
    /// Creates a new OIDC configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self::builder(issuer_url, client_id, client_secret, redirect_uri).build()
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> OidcConfigBuilder {
        OidcConfigBuilder::new(issuer_url, client_id, client_secret, redirect_uri)
    }

    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes.split(',').map(str::trim).collect()
    }

    #[must_use]
    pub fn external_id_claim(&self) -> &str {
        &self.external_id_claim
    }

    #[must_use]
    pub fn department_claim(&self) -> &str {
        &self.department_claim
    }

    #[must_use]
    pub fn entrance_date_claim(&self) -> &str {
        &self.entrance_date_claim
    }

    #[must_use]
    pub fn display_name_claim(&self) -> &str {
        &self.display_name_claim
    }

    #[must_use]
    pub fn given_name_claim(&self) -> &str {
        &self.given_name_claim
    }
}

/// Builder for `OidcConfig`.
#[derive(Debug)]
pub struct OidcConfigBuilder {
    config: OidcConfig,
    scopes: Vec<String>,
}

impl OidcConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            config: OidcConfig {
                issuer_url,
                client_id,
                client_secret,
                redirect_uri,
                scopes: String::new(),
                external_id_claim: default_external_id_claim(),
                department_claim: default_department_claim(),
                entrance_date_claim: default_entrance_date_claim(),
                display_name_claim: default_display_name_claim(),
                given_name_claim: default_given_name_claim(),
            },
            scopes: default_scopes().split(',').map(str::to_string).collect(),
        }
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    #[must_use]
    pub fn external_id_claim(mut self, claim: String) -> Self {
        self.config.external_id_claim = claim;
        self
    }

    #[must_use]
    pub fn department_claim(mut self, claim: String) -> Self {
        self.config.department_claim = claim;
        self
    }

    #[must_use]
    pub fn entrance_date_claim(mut self, claim: String) -> Self {
        self.config.entrance_date_claim = claim;
        self
    }

    #[must_use]
    pub fn display_name_claim(mut self, claim: String) -> Self {
        self.config.display_name_claim = claim;
        self
    }

    #[must_use]
    pub fn given_name_claim(mut self, claim: String) -> Self {
        self.config.given_name_claim = claim;
        self
    }

    /// Builds the `OidcConfig`.
    #[must_use]
    pub fn build(mut self) -> OidcConfig {
        self.config.scopes = self.scopes.join(",");
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> OidcConfigBuilder {
        OidcConfig::builder(
            "https://sso.example.edu".to_string(),
            "campus-gate".to_string(),
            "client-secret".to_string(),
            "https://verify.example.edu/auth/callback".to_string(),
        )
    }

    #[test]
    fn new_config_has_defaults() {
        let config = builder().build();

        assert_eq!(config.issuer_url(), "https://sso.example.edu");
        assert_eq!(config.client_id(), "campus-gate");
        assert_eq!(config.client_secret(), "client-secret");
        assert_eq!(
            config.redirect_uri(),
            "https://verify.example.edu/auth/callback"
        );
        assert_eq!(config.scopes(), vec!["openid", "profile"]);
        assert_eq!(config.external_id_claim(), "sub");
        assert_eq!(config.department_claim(), "department");
        assert_eq!(config.entrance_date_claim(), "entrance_date");
        assert_eq!(config.display_name_claim(), "name");
        assert_eq!(config.given_name_claim(), "given_name");
    }

    #[test]
    fn builder_allows_customization() {
        let config = builder()
            .external_id_claim("eduPersonPrincipalName".to_string())
            .department_claim("ou".to_string())
            .entrance_date_claim("enrollment_year".to_string())
            .add_scope("student".to_string())
            .build();

        assert_eq!(config.external_id_claim(), "eduPersonPrincipalName");
        assert_eq!(config.department_claim(), "ou");
        assert_eq!(config.entrance_date_claim(), "enrollment_year");
        assert!(config.scopes().contains(&"student"));
    }

    #[test]
    fn builder_add_scope_does_not_duplicate() {
        let config = builder().add_scope("openid".to_string()).build();

        let openid_count = config.scopes().iter().filter(|s| *s == &"openid").count();
        assert_eq!(openid_count, 1);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "issuer_url": "https://sso.example.edu",
            "client_id": "campus-gate",
            "client_secret": "secret",
            "redirect_uri": "https://verify.example.edu/auth/callback",
            "scopes": "openid, profile, student",
            "department_claim": "ou"
        }"#;

        let config: OidcConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.scopes(), vec!["openid", "profile", "student"]);
        assert_eq!(config.department_claim(), "ou");
        assert_eq!(config.external_id_claim(), "sub");
    }
}
