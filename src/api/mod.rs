// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::OriginalUri,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{auth::middleware::require_identity, state::AppState};

pub mod health;
pub mod me;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(me::get_me))
        .route("/me/profile", get(me::get_profile))
        .route("/me/photo", get(me::get_photo))
        .route("/users/{upn}/photo", get(me::get_user_photo))
        .route_layer(from_fn_with_state(state.clone(), require_identity));

    let api_routes = Router::new()
        .route("/health", get(health::api_health))
        .merge(protected)
        .fallback(api_not_found);

    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        });

    Router::new()
        .nest("/api", api_routes)
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(trace_layer)
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

async fn api_not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "path": uri.path(),
        })),
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::api_health,
        health::liveness,
        health::readiness,
        me::get_me,
        me::get_profile,
        me::get_photo,
        me::get_user_photo
    ),
    components(
        schemas(
            health::OkResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            me::IdentityResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Identity", description = "Verified caller identity"),
        (name = "Directory", description = "Directory resources via delegated or application access")
    )
)]
struct ApiDoc;
