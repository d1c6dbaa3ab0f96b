//! Verification routes: link landing, provider callback, health.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use campus_gate_identity::{
    AuthenticationError, VerificationToken, complete_verification, open_verification,
};
use rootcause::Report;
use serde::Deserialize;
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::{info, instrument};

use super::{
    AppState,
    oidc::{AuthState, OidcError},
};

/// Auth state cookie name (for CSRF protection during the OIDC flow).
const AUTH_STATE_COOKIE: &str = "verify_state";

/// Query parameters for the OIDC callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    /// Set by the provider when the user declined or the login failed.
    error: Option<String>,
}

/// Landing page of a verification link.
///
/// Checks the link is still usable and redirects to the identity provider.
#[instrument(skip(state, jar))]
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let token = VerificationToken::from(token);
    open_verification(&state.stores.verification_requests, &token).await?;

    let (auth_url, auth_state) = state.oidc_client.authorization_url();

    let auth_state_json = serde_json::to_string(&AuthStateData {
        csrf_token: auth_state.csrf_token,
        pkce_verifier: auth_state.pkce_verifier,
        nonce: auth_state.nonce,
        request_token: token.to_string(),
    })
    .map_err(|_| AuthError::InvalidAuthState)?;

    let cookie = Cookie::build((AUTH_STATE_COOKIE, auth_state_json))
        .path("/")
        .http_only(true)
        .secure(state.verification.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(state.verification.auth_state_minutes));

    Ok((jar.add(cookie), Redirect::to(&auth_url)))
}

/// Handles the OIDC callback after the user authenticates with their institution.
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    if let Some(error) = query.error {
        return Err(AuthError::ProviderDenied(error));
    }

    let auth_state_cookie = jar
        .get(AUTH_STATE_COOKIE)
        .ok_or(AuthError::MissingAuthState)?;

    let auth_state_data: AuthStateData =
        serde_json::from_str(auth_state_cookie.value()).map_err(|_| AuthError::InvalidAuthState)?;

    let (Some(code), Some(csrf)) = (query.code, query.state) else {
        return Err(AuthError::InvalidAuthState);
    };
    if csrf != auth_state_data.csrf_token {
        return Err(AuthError::CsrfMismatch);
    }

    let auth_state = AuthState {
        csrf_token: auth_state_data.csrf_token,
        pkce_verifier: auth_state_data.pkce_verifier,
        nonce: auth_state_data.nonce,
    };

    let update = state
        .oidc_client
        .exchange_code(&code, &auth_state)
        .await
        .map_err(|e| match e {
            OidcError::Claims(err) => AuthError::Verification(err),
            other => AuthError::TokenExchange(other.to_string()),
        })?;

    let token = VerificationToken::from(auth_state_data.request_token);
    let (request, record) = complete_verification(
        &state.stores.verification_requests,
        &state.stores.identities,
        &token,
        update,
    )
    .await?;

    info!(
        user = %request.platform_user_id(),
        community = %request.community_id(),
        verified = record.verified(),
        "identity recorded"
    );

    let remove_auth_state = Cookie::build((AUTH_STATE_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    let page = if record.verified() {
        result_page(
            "Verified",
            "You are verified. Return to the chat; your roles will be updated shortly.",
        )
    } else {
        result_page(
            "Verification incomplete",
            "Your institution did not report both a department and an entrance date, so no roles can be assigned yet. Please contact the server staff.",
        )
    };

    Ok((jar.add(remove_auth_state), page))
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

fn result_page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body><h1>{title}</h1><p>{message}</p></body>\n</html>\n"
    ))
}

/// Serializable auth state for cookie storage.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct AuthStateData {
    csrf_token: String,
    pkce_verifier: String,
    nonce: String,
    /// Verification link the login belongs to.
    request_token: String,
}

/// Verification flow errors.
#[derive(Debug)]
pub enum AuthError {
    MissingAuthState,
    InvalidAuthState,
    CsrfMismatch,
    ProviderDenied(String),
    TokenExchange(String),
    Verification(AuthenticationError),
}

impl From<Report<AuthenticationError>> for AuthError {
    fn from(report: Report<AuthenticationError>) -> Self {
        Self::Verification(report.current_context().clone())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::MissingAuthState => (
                StatusCode::BAD_REQUEST,
                "Your login session was not found. Please open your verification link again.",
            ),
            Self::InvalidAuthState => (
                StatusCode::BAD_REQUEST,
                "Your login session is invalid. Please open your verification link again.",
            ),
            Self::CsrfMismatch => (StatusCode::BAD_REQUEST, "CSRF token mismatch"),
            Self::ProviderDenied(error) => {
                tracing::warn!(%error, "identity provider returned an error");
                (
                    StatusCode::BAD_REQUEST,
                    "Your institution did not complete the login.",
                )
            }
            Self::TokenExchange(msg) => {
                tracing::error!("Token exchange failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "Authentication failed")
            }
            Self::Verification(err) => {
                let status = match &err {
                    AuthenticationError::RequestNotFound { .. } => StatusCode::NOT_FOUND,
                    AuthenticationError::RequestExpired { .. }
                    | AuthenticationError::RequestConsumed { .. } => StatusCode::GONE,
                    AuthenticationError::InvalidToken { .. }
                    | AuthenticationError::MissingClaim { .. }
                    | AuthenticationError::InvalidClaim { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    AuthenticationError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(error = %err, "verification failed");
                } else {
                    tracing::warn!(error = %err, "verification rejected");
                }
                (status, err.user_message())
            }
        };

        (status, result_page("Verification failed", message)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_link_is_gone() {
        let response = AuthError::Verification(AuthenticationError::RequestExpired {
            token: "01H".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[test]
    fn unknown_link_is_not_found() {
        let response = AuthError::Verification(AuthenticationError::RequestNotFound {
            token: "01H".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn missing_claims_are_unprocessable() {
        let response = AuthError::Verification(AuthenticationError::MissingClaim {
            claim: "sub".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn store_failures_are_internal_errors() {
        let response = AuthError::Verification(AuthenticationError::Store {
            reason: "pool timed out".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn csrf_mismatch_is_bad_request() {
        assert_eq!(
            AuthError::CsrfMismatch.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn result_page_contains_message() {
        let Html(body) = result_page("Verified", "You are verified.");
        assert!(body.contains("<h1>Verified</h1>"));
        assert!(body.contains("You are verified."));
    }
}
