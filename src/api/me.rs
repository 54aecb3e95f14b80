// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller identity and brokered directory resources.

use axum::{
    extract::{Path, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::{Identity, VerifiedIdentity};
use crate::broker::{BrokeredOutcome, NormalizedOutcome, Resource};
use crate::error::ApiError;
use crate::state::AppState;

const PHOTO_CACHE_CONTROL: &str = "private, max-age=300";

/// Response for GET /api/me
#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityResponse {
    /// Realm subject identifier, when the realm issues one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub issuer: String,
    pub audience: Vec<String>,
    pub roles: Vec<String>,
    /// Token expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<VerifiedIdentity> for IdentityResponse {
    fn from(identity: VerifiedIdentity) -> Self {
        Self {
            expires_at: i64::try_from(identity.expires_at)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            audience: identity.audience.to_vec(),
            roles: identity.realm_roles.iter().map(str::to_string).collect(),
            subject: identity.subject,
            username: identity.username,
            email: identity.email,
            name: identity.display_name,
            issuer: identity.issuer,
        }
    }
}

/// Get the verified identity of the caller.
///
/// No upstream calls are made.
#[utoipa::path(
    get,
    path = "/api/me",
    tag = "Identity",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Verified caller identity", body = IdentityResponse),
        (status = 401, description = "Missing or invalid bearer token"),
    )
)]
pub async fn get_me(Identity(caller): Identity) -> Json<IdentityResponse> {
    Json(caller.into())
}

/// Get the caller's directory profile, with their manager expanded.
#[utoipa::path(
    get,
    path = "/api/me/profile",
    tag = "Directory",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Profile JSON as returned by the resource API"),
        (status = 204, description = "No profile for this caller"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 502, description = "Upstream error or no usable token"),
        (status = 504, description = "Upstream timeout"),
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Response, ApiError> {
    let brokered = state.broker.access(&caller, &Resource::Profile).await?;
    log_brokered(&caller, &Resource::Profile, &brokered);
    outcome_response(brokered.outcome, "application/json", None)
}

/// Get the caller's profile photo.
#[utoipa::path(
    get,
    path = "/api/me/photo",
    tag = "Directory",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Photo bytes with the upstream content type"),
        (status = 204, description = "Caller has no photo"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 502, description = "Upstream error or no usable token"),
        (status = 504, description = "Upstream timeout"),
    )
)]
pub async fn get_photo(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Response, ApiError> {
    let brokered = state.broker.access(&caller, &Resource::Photo).await?;
    log_brokered(&caller, &Resource::Photo, &brokered);
    outcome_response(brokered.outcome, "image/jpeg", Some(PHOTO_CACHE_CONTROL))
}

/// Get another user's profile photo by user principal name.
///
/// Restricted to the configured realm roles, if any.
#[utoipa::path(
    get,
    path = "/api/users/{upn}/photo",
    tag = "Directory",
    security(("bearer" = [])),
    params(("upn" = String, Path, description = "User principal name")),
    responses(
        (status = 200, description = "Photo bytes with the upstream content type"),
        (status = 204, description = "User has no photo"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller lacks a required realm role"),
        (status = 502, description = "Upstream error or no usable token"),
        (status = 504, description = "Upstream timeout"),
    )
)]
pub async fn get_user_photo(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(upn): Path<String>,
) -> Result<Response, Response> {
    caller
        .realm_roles
        .require_any(&state.directory_photo_roles[..])
        .map_err(|e| {
            info!(
                subject = caller.subject.as_deref(),
                "Directory photo lookup refused: missing realm role"
            );
            e.into_response()
        })?;

    let resource = Resource::UserPhoto { user: upn };
    let brokered = state
        .broker
        .access(&caller, &resource)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;
    log_brokered(&caller, &resource, &brokered);
    outcome_response(brokered.outcome, "image/jpeg", Some(PHOTO_CACHE_CONTROL))
        .map_err(IntoResponse::into_response)
}

fn log_brokered(caller: &VerifiedIdentity, resource: &Resource, brokered: &BrokeredOutcome) {
    info!(
        subject = caller.subject.as_deref(),
        resource = resource.name(),
        path = brokered.path.as_str(),
        outcome = brokered.outcome.kind(),
        "Resource brokered"
    );
}

/// Render a final outcome. `NotFound` is "no content", not an error.
fn outcome_response(
    outcome: NormalizedOutcome,
    default_content_type: &str,
    cache_control: Option<&'static str>,
) -> Result<Response, ApiError> {
    match outcome {
        NormalizedOutcome::Success { body, content_type } => {
            let content_type =
                content_type.unwrap_or_else(|| default_content_type.to_string());
            let mut response = ([(CONTENT_TYPE, content_type)], body).into_response();
            if let Some(value) = cache_control {
                response
                    .headers_mut()
                    .insert(CACHE_CONTROL, axum::http::HeaderValue::from_static(value));
            }
            Ok(response)
        }
        NormalizedOutcome::NotFound => Ok(StatusCode::NO_CONTENT.into_response()),
        NormalizedOutcome::Unauthorized { status } => Err(ApiError::upstream(
            status,
            "resource API refused every available token",
        )),
        NormalizedOutcome::UpstreamError { status, body } => Err(ApiError::upstream(status, body)),
        NormalizedOutcome::Timeout => Err(ApiError::upstream_timeout()),
        NormalizedOutcome::Unavailable(detail) => Err(ApiError::upstream_unavailable(detail)),
    }
}
