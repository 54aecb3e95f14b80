// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application-level token via the client-credentials grant.
//!
//! One token is shared by every request. It is refreshed once it comes
//! within the safety margin of expiry; concurrent callers that find it stale
//! wait on a single refresh instead of each starting a grant. Failed grants
//! are never cached.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::token::{AccessToken, TokenResponse};
use super::AppTokenError;
use crate::config::{ClientCredentials, GrantPolicy};

/// Upper bound on the lifetime honoured from a grant's `expires_in`.
const MAX_GRANT_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: AccessToken,
    pub expires_at: Instant,
}

impl CachedToken {
    /// Usable at `now` if it outlives `now` by more than `margin`.
    pub fn is_fresh_at(&self, now: Instant, margin: Duration) -> bool {
        now.checked_add(margin).is_some_and(|deadline| deadline < self.expires_at)
    }
}

pub struct AppTokenCache {
    credentials: Option<ClientCredentials>,
    policy: GrantPolicy,
    http: Client,
    slot: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl AppTokenCache {
    pub fn new(credentials: Option<ClientCredentials>, policy: GrantPolicy, http: Client) -> Self {
        Self {
            credentials,
            policy,
            http,
            slot: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Current application token, granting a new one when the cached token
    /// is missing or about to expire.
    pub async fn get_app_token(&self) -> Result<AccessToken, AppTokenError> {
        let credentials = self.credentials.as_ref().ok_or(AppTokenError::NotConfigured)?;

        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let (token, lifetime) = self.grant_with_retry(credentials).await?;
        let now = Instant::now();
        let expires_at = now
            .checked_add(lifetime)
            .or_else(|| now.checked_add(self.policy.default_lifetime))
            .unwrap_or(now);
        *self.slot.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        info!(
            lifetime_secs = lifetime.as_secs(),
            client_id = %credentials.client_id,
            "Application token refreshed"
        );
        Ok(token)
    }

    /// Drop the cached token if it is still `token`. A token refreshed by
    /// someone else in the meantime is left alone.
    pub async fn invalidate(&self, token: &AccessToken) {
        let mut slot = self.slot.write().await;
        if slot.as_ref().is_some_and(|cached| &cached.token == token) {
            *slot = None;
            info!("Application token invalidated after upstream rejection");
        }
    }

    async fn fresh_token(&self) -> Option<AccessToken> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|cached| cached.is_fresh_at(Instant::now(), self.policy.safety_margin))
            .map(|cached| cached.token.clone())
    }

    async fn grant_with_retry(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<(AccessToken, Duration), AppTokenError> {
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 1u32;

        loop {
            match self.grant_once(credentials).await {
                Ok(granted) => return Ok(granted),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    debug!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Client credentials grant failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn grant_once(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<(AccessToken, Duration), AppTokenError> {
        tokio::time::timeout(self.policy.attempt_timeout, self.request_grant(credentials))
            .await
            .map_err(|_| AppTokenError::Timeout)?
    }

    async fn request_grant(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<(AccessToken, Duration), AppTokenError> {
        let form = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", credentials.scope.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(credentials.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppTokenError::Timeout
                } else {
                    AppTokenError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let status_code = status.as_u16();
            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    AppTokenError::Upstream {
                        status: status_code,
                        body,
                    }
                } else {
                    AppTokenError::CredentialRejected {
                        status: status_code,
                        body,
                    }
                },
            );
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|_| AppTokenError::MissingAccessToken)?;
        let token = parsed.token().ok_or(AppTokenError::MissingAccessToken)?;
        let lifetime = parsed
            .expires_in
            .map(|secs| Duration::from_secs(secs).min(MAX_GRANT_LIFETIME))
            .unwrap_or(self.policy.default_lifetime);
        Ok((token, lifetime))
    }
}
