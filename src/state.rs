// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{IssuerCandidates, KeyResolver, TokenVerifier};
use crate::broker::{AppTokenCache, DelegatedTokenExchanger, ResourceBroker, ResourceFetcher};
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub broker: Arc<ResourceBroker>,
    /// Realm roles allowed to read other users' photos. Empty allows any
    /// authenticated caller.
    pub directory_photo_roles: Arc<[String]>,
}

impl AppState {
    pub fn new(
        verifier: TokenVerifier,
        broker: ResourceBroker,
        directory_photo_roles: Vec<String>,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            broker: Arc::new(broker),
            directory_photo_roles: directory_photo_roles.into(),
        }
    }

    /// Wire every component from configuration. All outbound calls share
    /// one keep-alive connection pool.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let http = outbound_client()?;

        let keys = KeyResolver::new(
            config.realm.jwks_url().as_str(),
            &config.verifier.key_set,
            http.clone(),
        );
        let verifier = TokenVerifier::new(
            IssuerCandidates::from_realm(&config.realm),
            config.realm.audience.clone(),
            config.verifier.algorithms.clone(),
            config.verifier.clock_skew,
            Arc::new(keys),
        );

        let broker = ResourceBroker::new(
            DelegatedTokenExchanger::new(
                config.realm.token_exchange_url().as_str(),
                config.broker.exchange_timeout,
                http.clone(),
            ),
            AppTokenCache::new(
                config.broker.credentials.clone(),
                config.broker.grant.clone(),
                http.clone(),
            ),
            ResourceFetcher::new(config.broker.resource_timeout, http),
            config.broker.resource_base_url.clone(),
        );

        Ok(Self::new(
            verifier,
            broker,
            config.broker.directory_photo_roles.clone(),
        ))
    }
}

fn outbound_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .tcp_keepalive(Duration::from_secs(60))
        .user_agent(concat!("identity-broker/", env!("CARGO_PKG_VERSION")))
        .build()
}
