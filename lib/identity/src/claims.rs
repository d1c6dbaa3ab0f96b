//! Mapping ID token claims onto an identity update.
//!
//! Only the raw payload is decoded here. Signature and nonce validation
//! happen in the OIDC client before the token reaches this module.

use crate::error::AuthenticationError;
use crate::oidc::OidcConfig;
use base64::Engine;
use campus_gate_core::ExternalId;
use campus_gate_verification::IdentityUpdate;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

/// Decodes the payload segment of a compact JWT.
///
/// # Errors
///
/// Returns [`AuthenticationError::InvalidToken`] if the token is not three
/// dot-separated segments or the payload is not base64url-encoded JSON.
pub fn decode_jwt_payload(id_token: &str) -> Result<Value, AuthenticationError> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthenticationError::InvalidToken {
            reason: "invalid JWT format".to_string(),
        });
    }

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("failed to decode JWT payload: {e}"),
        })?;

    serde_json::from_slice(&payload_bytes).map_err(|e| AuthenticationError::InvalidToken {
        reason: format!("failed to parse JWT payload: {e}"),
    })
}

/// Builds an identity update from decoded ID token claims.
///
/// The external id claim is required. Department and entrance date may
/// be absent, which yields an unverified record.
///
/// # Errors
///
/// Returns [`AuthenticationError::MissingClaim`] without an external id and
/// [`AuthenticationError::InvalidClaim`] for an entrance date that cannot
/// be read.
pub fn identity_from_claims(
    payload: &Value,
    config: &OidcConfig,
) -> Result<IdentityUpdate, AuthenticationError> {
    let external_id = string_claim(payload, config.external_id_claim()).ok_or_else(|| {
        AuthenticationError::MissingClaim {
            claim: config.external_id_claim().to_string(),
        }
    })?;

    let department = department_claim(payload.get(config.department_claim()));
    let entrance_date = match payload.get(config.entrance_date_claim()) {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_entrance_date(value).ok_or_else(|| {
            AuthenticationError::InvalidClaim {
                claim: config.entrance_date_claim().to_string(),
                reason: format!("unrecognized date {value}"),
            }
        })?),
    };

    debug!(
        has_department = department.is_some(),
        has_entrance_date = entrance_date.is_some(),
        "mapped identity claims"
    );

    Ok(IdentityUpdate {
        external_id: Some(ExternalId::new(external_id)),
        department,
        entrance_date,
        display_name: string_claim(payload, config.display_name_claim()),
        given_name: string_claim(payload, config.given_name_claim()),
    })
}

fn string_claim(payload: &Value, claim: &str) -> Option<String> {
    payload
        .get(claim)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Providers send either one department or a list; the first entry is primary.
fn department_claim(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD` dates and bare years.
///
/// A bare year becomes January 1st of that year.
fn parse_entrance_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|year| i32::try_from(year).ok())
            .and_then(start_of_year),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
                return Some(timestamp.with_timezone(&Utc));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            }
            if s.len() == 4 {
                return s.parse().ok().and_then(start_of_year);
            }
            None
        }
        _ => None,
    }
}

fn start_of_year(year: i32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()
}
