// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Delegated token exchange through the realm's identity broker.
//!
//! The caller's own realm token is presented to
//! `<realm-base>/realms/<realm>/broker/<alias>/token`, which answers with the
//! upstream provider token stored for that user's session. Nothing is cached:
//! every resource call exchanges afresh.

use std::time::Duration;

use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use tracing::debug;

use super::token::{AccessToken, TokenResponse};
use super::ExchangeError;

pub struct DelegatedTokenExchanger {
    endpoint: String,
    timeout: Duration,
    http: Client,
}

impl DelegatedTokenExchanger {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, http: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Exchange the caller's realm token for an upstream access token.
    pub async fn exchange(&self, caller_token: &str) -> Result<AccessToken, ExchangeError> {
        tokio::time::timeout(self.timeout, self.request(caller_token))
            .await
            .map_err(|_| ExchangeError::Timeout)?
    }

    async fn request(&self, caller_token: &str) -> Result<AccessToken, ExchangeError> {
        let response = self
            .http
            .get(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {caller_token}"))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExchangeError::Timeout
                } else {
                    ExchangeError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ExchangeError::EndpointNotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        let parsed = parse_token_body(&body).ok_or(ExchangeError::MissingAccessToken)?;
        debug!(expires_in = ?parsed.expires_in, "Exchanged caller token for a delegated token");
        parsed.token().ok_or(ExchangeError::MissingAccessToken)
    }
}

/// The broker returns the stored provider response verbatim, which is JSON
/// for most providers and form-encoded for some.
fn parse_token_body(body: &[u8]) -> Option<TokenResponse> {
    if let Ok(parsed) = serde_json::from_slice::<TokenResponse>(body) {
        return Some(parsed);
    }

    let mut response = TokenResponse {
        access_token: None,
        expires_in: None,
    };
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "access_token" => response.access_token = Some(value.into_owned()),
            "expires_in" => response.expires_in = value.parse().ok(),
            _ => {}
        }
    }
    response.access_token.is_some().then_some(response)
}
