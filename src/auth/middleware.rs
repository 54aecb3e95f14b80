// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Applied once to a router subtree: every request is verified before it
//! reaches a handler, and the resulting [`VerifiedIdentity`] is attached to
//! the request extensions for the [`Identity`](super::Identity) extractor.
//!
//! ```rust,ignore
//! let api = Router::new()
//!     .route("/me", get(me))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_identity));
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::{AuthError, VerifiedIdentity};
use crate::state::AppState;

/// Verify the bearer token and attach the caller identity.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let result = state.verifier.verify(&authorization).await;
    match result {
        Ok(identity) => {
            debug!(subject = identity.subject.as_deref(), "Authenticated request");
            request.extensions_mut().insert::<VerifiedIdentity>(identity);
            next.run(request).await
        }
        Err(error) => {
            log_rejection(&error, request.uri().path());
            error.into_response()
        }
    }
}

fn log_rejection(error: &AuthError, path: &str) {
    match error {
        AuthError::IssuerMismatch { expected, received } => warn!(
            path,
            ?expected,
            ?received,
            "Rejected token from an unexpected issuer; check KC_URL/KC_REALM/KC_ISSUER"
        ),
        AuthError::KeysUnavailable(reason) => {
            warn!(path, reason = %reason, "Cannot verify token: realm keys unavailable")
        }
        other => debug!(path, error_code = other.error_code(), "Rejected request"),
    }
}
