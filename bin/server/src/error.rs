//! Domain error types for server operations.

use std::fmt;

/// Errors that stop the server from starting or keep it from serving.
#[derive(Debug)]
pub enum StartupError {
    /// Required configuration is missing or invalid.
    Config { details: String },
    /// The database could not be reached.
    Database { details: String },
    /// Migrations failed.
    Migration { details: String },
    /// The identity provider could not be discovered.
    Oidc { details: String },
    /// The custom import document could not be loaded.
    CustomImport { path: String, details: String },
    /// The listener could not bind.
    Bind { addr: String, details: String },
    /// The HTTP server stopped with an error.
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Database { details } => write!(f, "database connection failed: {details}"),
            Self::Migration { details } => write!(f, "database migration failed: {details}"),
            Self::Oidc { details } => write!(f, "identity provider setup failed: {details}"),
            Self::CustomImport { path, details } => {
                write!(f, "failed to load custom import '{path}': {details}")
            }
            Self::Bind { addr, details } => write!(f, "failed to bind to {addr}: {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_import_error_names_the_file() {
        let err = StartupError::CustomImport {
            path: "/etc/campus-gate/import.json".to_string(),
            details: "expected an array".to_string(),
        };
        assert!(err.to_string().contains("/etc/campus-gate/import.json"));
        assert!(err.to_string().contains("expected an array"));
    }
}
