// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the verified caller.
//!
//! ```rust,ignore
//! async fn my_handler(Identity(caller): Identity) -> impl IntoResponse {
//!     // caller is VerifiedIdentity
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, VerifiedIdentity};
use crate::state::AppState;

/// The verified caller of the current request.
///
/// Reuses the identity attached by
/// [`require_identity`](super::middleware::require_identity) when present;
/// otherwise verifies the `Authorization` header itself.
pub struct Identity(pub VerifiedIdentity);

impl FromRequestParts<AppState> for Identity {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<VerifiedIdentity>().cloned() {
            return Ok(Identity(identity));
        }

        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let identity = state.verifier.verify(authorization).await?;
        Ok(Identity(identity))
    }
}
