// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resource fetch with outcome normalization.

use std::time::Duration;

use axum::body::Bytes;
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use url::Url;

use super::token::AccessToken;

/// Result of one resource fetch, reduced to what the fallback chain and the
/// HTTP layer act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedOutcome {
    Success {
        body: Bytes,
        content_type: Option<String>,
    },
    /// The resource does not exist for this subject. Terminal.
    NotFound,
    /// The token was refused (401/403). Worth trying the next token.
    Unauthorized { status: u16 },
    UpstreamError { status: u16, body: String },
    Timeout,
    /// No HTTP response at all (connection refused, reset, DNS).
    Unavailable(String),
}

impl NormalizedOutcome {
    /// Map an upstream status and body onto an outcome.
    pub fn classify(status: StatusCode, content_type: Option<String>, body: Bytes) -> Self {
        match status {
            s if s.is_success() => NormalizedOutcome::Success { body, content_type },
            StatusCode::NOT_FOUND => NormalizedOutcome::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => NormalizedOutcome::Unauthorized {
                status: status.as_u16(),
            },
            s => NormalizedOutcome::UpstreamError {
                status: s.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NormalizedOutcome::Success { .. })
    }

    /// Anything short of a terminal answer lets the next token in the chain
    /// try. Only `Success` and `NotFound` are terminal.
    pub fn allows_fallback(&self) -> bool {
        !matches!(
            self,
            NormalizedOutcome::Success { .. } | NormalizedOutcome::NotFound
        )
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedOutcome::Success { .. } => "success",
            NormalizedOutcome::NotFound => "not_found",
            NormalizedOutcome::Unauthorized { .. } => "unauthorized",
            NormalizedOutcome::UpstreamError { .. } => "upstream_error",
            NormalizedOutcome::Timeout => "timeout",
            NormalizedOutcome::Unavailable(_) => "unavailable",
        }
    }
}

pub struct ResourceFetcher {
    http: Client,
    timeout: Duration,
}

impl ResourceFetcher {
    pub fn new(timeout: Duration, http: Client) -> Self {
        Self { http, timeout }
    }

    /// GET `url` with `token`. Never fails; every result is an outcome.
    pub async fn fetch(&self, url: &Url, token: &AccessToken) -> NormalizedOutcome {
        match tokio::time::timeout(self.timeout, self.request(url, token)).await {
            Ok(outcome) => outcome,
            Err(_) => NormalizedOutcome::Timeout,
        }
    }

    async fn request(&self, url: &Url, token: &AccessToken) -> NormalizedOutcome {
        let response = match self
            .http
            .get(url.clone())
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return NormalizedOutcome::Timeout,
            Err(e) => return NormalizedOutcome::Unavailable(e.to_string()),
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(body) => NormalizedOutcome::classify(status, content_type, body),
            Err(e) if e.is_timeout() => NormalizedOutcome::Timeout,
            Err(e) => NormalizedOutcome::Unavailable(e.to_string()),
        }
    }
}
