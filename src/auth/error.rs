// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

const ISSUER_HINT: &str =
    "Adjust KC_URL/KC_REALM or set KC_ISSUER so it matches the token's 'iss' claim exactly.";
const AUDIENCE_HINT: &str = "Adjust KC_AUDIENCE or check the 'aud' claim of the access token.";

/// Authentication error type.
///
/// Everything except `KeysUnavailable` is a client fault and is never
/// retried; `KeysUnavailable` means the key-set endpoint could not be
/// consulted and is reported as a gateway-style failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization: Bearer <token>` header
    #[error("Authorization header with a Bearer token is required")]
    MissingBearer,

    /// Token could not be parsed
    #[error("Token is malformed")]
    MalformedToken,

    /// `iss` is not one of the accepted issuers
    #[error("Token issuer is not accepted")]
    IssuerMismatch {
        expected: Vec<String>,
        received: Option<String>,
    },

    /// Signature, algorithm or signing key rejected
    #[error("Token signature is invalid")]
    SignatureInvalid,

    /// Token expired beyond the clock skew tolerance
    #[error("Token has expired")]
    Expired,

    /// Configured audience not present in `aud`
    #[error("Token audience is not accepted")]
    AudienceMismatch {
        expected: String,
        received: Vec<String>,
    },

    /// Key set could not be fetched
    #[error("Signing keys are unavailable: {0}")]
    KeysUnavailable(String),

    /// Caller lacks every one of the required realm roles
    #[error("Insufficient realm roles for this operation")]
    InsufficientRole { required: Vec<String> },
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    got: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingBearer => "missing_bearer",
            AuthError::MalformedToken => "invalid_jwt_format",
            AuthError::IssuerMismatch { .. } => "issuer_mismatch",
            AuthError::SignatureInvalid => "invalid_signature",
            AuthError::Expired => "token_expired",
            AuthError::AudienceMismatch { .. } => "audience_mismatch",
            AuthError::KeysUnavailable(_) => "keys_unavailable",
            AuthError::InsufficientRole { .. } => "insufficient_role",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::KeysUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InsufficientRole { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn body(&self) -> AuthErrorBody {
        let mut body = AuthErrorBody {
            error: self.error_code(),
            message: self.to_string(),
            expected: None,
            got: None,
            hint: None,
        };
        match self {
            AuthError::IssuerMismatch { expected, received } => {
                body.expected = Some(serde_json::json!(expected));
                body.got = Some(serde_json::json!(received));
                body.hint = Some(ISSUER_HINT);
            }
            AuthError::AudienceMismatch { expected, received } => {
                body.expected = Some(serde_json::json!(expected));
                body.got = Some(serde_json::json!(received));
                body.hint = Some(AUDIENCE_HINT);
            }
            AuthError::InsufficientRole { required } => {
                body.expected = Some(serde_json::json!(required));
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_bearer_returns_401() {
        let (status, body) = body_of(AuthError::MissingBearer).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing_bearer");
        assert!(body.get("hint").is_none());
    }

    #[tokio::test]
    async fn issuer_mismatch_echoes_candidates_and_received() {
        let err = AuthError::IssuerMismatch {
            expected: vec![
                "https://sso.example.com/realms/imt".to_string(),
                "https://sso.example.com/auth/realms/imt".to_string(),
            ],
            received: Some("https://other.example.com/realms/imt".to_string()),
        };
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "issuer_mismatch");
        assert_eq!(body["expected"].as_array().unwrap().len(), 2);
        assert_eq!(body["got"], "https://other.example.com/realms/imt");
        assert!(body["hint"].as_str().unwrap().contains("KC_ISSUER"));
    }

    #[tokio::test]
    async fn unavailable_keys_are_not_client_faults() {
        let (status, body) = body_of(AuthError::KeysUnavailable("rate limited".into())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "keys_unavailable");
    }

    #[tokio::test]
    async fn insufficient_role_returns_403() {
        let err = AuthError::InsufficientRole {
            required: vec!["access:rrhh".to_string()],
        };
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["expected"][0], "access:rrhh");
    }
}
