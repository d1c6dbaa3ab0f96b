//! Error types for the identity crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `AuthenticationError`: failures while turning a provider login into
//!   an identity record, including pending-request checks

use std::fmt;

/// Errors from completing an institutional verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The ID token could not be decoded.
    InvalidToken { reason: String },
    /// A required claim is absent from the ID token.
    MissingClaim { claim: String },
    /// A claim is present but has an unusable value.
    InvalidClaim { claim: String, reason: String },
    /// No verification request exists for the link token.
    RequestNotFound { token: String },
    /// The verification link expired before it was used.
    RequestExpired { token: String },
    /// The verification link was already used.
    RequestConsumed { token: String },
    /// The request or identity store failed.
    Store { reason: String },
}

impl AuthenticationError {
    /// Returns the message shown on the verification result page.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidToken { .. } | Self::MissingClaim { .. } | Self::InvalidClaim { .. } => {
                "Your institution did not return the information needed to verify you."
            }
            Self::RequestNotFound { .. } => "This verification link is not valid.",
            Self::RequestExpired { .. } => {
                "This verification link has expired. Please request a new one."
            }
            Self::RequestConsumed { .. } => {
                "This verification link was already used. Please request a new one."
            }
            Self::Store { .. } => "Something went wrong. Please try again later.",
        }
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken { reason } => {
                write!(f, "invalid token: {reason}")
            }
            Self::MissingClaim { claim } => {
                write!(f, "missing required claim: {claim}")
            }
            Self::InvalidClaim { claim, reason } => {
                write!(f, "invalid claim '{claim}': {reason}")
            }
            Self::RequestNotFound { token } => {
                write!(f, "verification request not found: {token}")
            }
            Self::RequestExpired { token } => {
                write!(f, "verification request has expired: {token}")
            }
            Self::RequestConsumed { token } => {
                write!(f, "verification request already used: {token}")
            }
            Self::Store { reason } => {
                write!(f, "store error: {reason}")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

impl From<campus_gate_verification::StoreError> for AuthenticationError {
    fn from(err: campus_gate_verification::StoreError) -> Self {
        Self::Store {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_gate_verification::StoreError;

    #[test]
    fn invalid_claim_display() {
        let err = AuthenticationError::InvalidClaim {
            claim: "entrance_date".to_string(),
            reason: "not a date".to_string(),
        };
        assert!(err.to_string().contains("entrance_date"));
        assert!(err.to_string().contains("not a date"));
    }

    #[test]
    fn store_error_converts() {
        let err = AuthenticationError::from(StoreError::Unavailable {
            reason: "pool timed out".to_string(),
        });
        assert!(matches!(err, AuthenticationError::Store { .. }));
        assert!(err.to_string().contains("pool timed out"));
    }

    #[test]
    fn user_message_hides_details() {
        let err = AuthenticationError::Store {
            reason: "relation \"identities\" does not exist".to_string(),
        };
        assert!(!err.user_message().contains("identities"));

        let expired = AuthenticationError::RequestExpired {
            token: "01H".to_string(),
        };
        assert!(expired.user_message().contains("expired"));
    }
}
