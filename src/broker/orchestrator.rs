// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The delegated → application fallback chain.
//!
//! The caller's own delegated token is always tried first so that per-user
//! consent is enough whenever it has been granted. The application token is
//! only used once the delegated path has conclusively failed, and never when
//! the delegated fetch succeeded or found nothing.

use url::Url;
use tracing::{debug, info, warn};

use super::{
    AppTokenCache, AppTokenError, BrokerError, DelegatedTokenExchanger, ExchangeError,
    NormalizedOutcome, Resource, ResourceFetcher,
};
use crate::auth::VerifiedIdentity;

/// Which token produced the final outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPath {
    Delegated,
    Application,
}

impl TokenPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPath::Delegated => "delegated",
            TokenPath::Application => "application",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokeredOutcome {
    pub outcome: NormalizedOutcome,
    pub path: TokenPath,
}

/// How the delegated step failed.
enum DelegatedFailure {
    Exchange(ExchangeError),
    Fetch(NormalizedOutcome),
}

impl DelegatedFailure {
    fn into_result(self) -> Result<BrokeredOutcome, BrokerError> {
        match self {
            DelegatedFailure::Exchange(e) => Err(BrokerError::Delegation(e)),
            DelegatedFailure::Fetch(outcome) => Ok(BrokeredOutcome {
                outcome,
                path: TokenPath::Delegated,
            }),
        }
    }
}

pub struct ResourceBroker {
    exchanger: DelegatedTokenExchanger,
    app_tokens: AppTokenCache,
    fetcher: ResourceFetcher,
    resource_base: Url,
}

impl ResourceBroker {
    pub fn new(
        exchanger: DelegatedTokenExchanger,
        app_tokens: AppTokenCache,
        fetcher: ResourceFetcher,
        resource_base: Url,
    ) -> Self {
        Self {
            exchanger,
            app_tokens,
            fetcher,
            resource_base,
        }
    }

    pub fn app_tokens(&self) -> &AppTokenCache {
        &self.app_tokens
    }

    /// Fetch `resource` on behalf of `identity`.
    ///
    /// Returns `Ok` whenever some fetch produced an outcome, including
    /// upstream errors. `Err` means no usable token could be obtained.
    pub async fn access(
        &self,
        identity: &VerifiedIdentity,
        resource: &Resource,
    ) -> Result<BrokeredOutcome, BrokerError> {
        let failure = match self.try_delegated(identity, resource).await {
            Ok(outcome) => {
                return Ok(BrokeredOutcome {
                    outcome,
                    path: TokenPath::Delegated,
                })
            }
            Err(failure) => failure,
        };

        let url = if resource.needs_caller_lookup() {
            match identity.directory_lookup_key() {
                Some(lookup) => resource.application_url(&self.resource_base, lookup),
                None => {
                    warn!(
                        subject = identity.subject.as_deref(),
                        resource = resource.name(),
                        "Caller has no directory lookup claim; application path skipped"
                    );
                    return failure.into_result();
                }
            }
        } else {
            resource.application_url(&self.resource_base, "")
        };

        let token = match self.app_tokens.get_app_token().await {
            Ok(token) => token,
            Err(AppTokenError::NotConfigured) => {
                debug!(
                    resource = resource.name(),
                    "Application credentials not configured; returning delegated result"
                );
                return failure.into_result();
            }
            Err(e) => {
                if e.is_configuration_fault() {
                    warn!(
                        error = %e,
                        hint = "check AZ_CLIENT_ID / AZ_CLIENT_SECRET and the app registration",
                        "Application token grant rejected"
                    );
                } else {
                    warn!(error = %e, "Application token unavailable");
                }
                return Err(BrokerError::AppToken(e));
            }
        };

        let outcome = self.fetcher.fetch(&url, &token).await;
        if let NormalizedOutcome::Unauthorized { status } = outcome {
            info!(status, resource = resource.name(), "Resource API refused the application token");
            self.app_tokens.invalidate(&token).await;
        }
        debug!(
            resource = resource.name(),
            outcome = outcome.kind(),
            path = TokenPath::Application.as_str(),
            "Resource fetched"
        );

        Ok(BrokeredOutcome {
            outcome,
            path: TokenPath::Application,
        })
    }

    /// The delegated step. `Ok` is terminal; `Err` moves on to the
    /// application path.
    async fn try_delegated(
        &self,
        identity: &VerifiedIdentity,
        resource: &Resource,
    ) -> Result<NormalizedOutcome, DelegatedFailure> {
        let token = match self.exchanger.exchange(identity.raw_token()).await {
            Ok(token) => token,
            Err(e) => {
                if e.is_configuration_fault() {
                    warn!(
                        endpoint = self.exchanger.endpoint(),
                        hint = "enable token storage and exchange for the identity-provider alias",
                        "Delegated token exchange endpoint not found, falling back"
                    );
                } else {
                    debug!(error = %e, "Delegated token exchange failed, falling back");
                }
                return Err(DelegatedFailure::Exchange(e));
            }
        };

        let outcome = self
            .fetcher
            .fetch(&resource.delegated_url(&self.resource_base), &token)
            .await;

        if outcome.allows_fallback() {
            debug!(
                resource = resource.name(),
                outcome = outcome.kind(),
                "Delegated fetch failed, falling back"
            );
            return Err(DelegatedFailure::Fetch(outcome));
        }
        debug!(
            resource = resource.name(),
            outcome = outcome.kind(),
            path = TokenPath::Delegated.as_str(),
            "Resource fetched"
        );
        Ok(outcome)
    }
}
