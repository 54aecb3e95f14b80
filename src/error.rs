// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::broker::BrokerError;

/// Upstream bodies echoed to the client are cut to this many characters.
const MAX_UPSTREAM_BODY: usize = 2048;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub upstream_status: Option<u16>,
    pub upstream_body: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            upstream_status: None,
            upstream_body: None,
        }
    }

    /// The resource API answered with a status the chain could not use.
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self {
            upstream_status: Some(status),
            upstream_body: Some(body.chars().take(MAX_UPSTREAM_BODY).collect()),
            ..Self::new(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                format!("resource API returned HTTP {status}"),
            )
        }
    }

    pub fn upstream_timeout() -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "upstream_timeout",
            "upstream call timed out",
        )
    }

    pub fn upstream_unavailable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_error", detail)
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        if err.is_timeout() {
            return Self::upstream_timeout();
        }
        Self::new(StatusCode::BAD_GATEWAY, "token_unavailable", err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.code,
            message: self.message,
            status: self.upstream_status,
            body: self.upstream_body,
        });
        (self.status, body).into_response()
    }
}
