// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Resource Access Broker
//!
//! Obtains an upstream token for a verified caller and fetches the resource
//! with it.
//!
//! ## Fallback chain
//!
//! 1. Exchange the caller's realm token for a delegated upstream token
//! 2. Fetch with it; `Success` and `NotFound` are final
//! 3. Otherwise take the shared application token (client credentials)
//! 4. Fetch again, addressing the caller by directory id or username
//!
//! Only the client-credentials grant retries. Every other outbound call is
//! attempted once per step, each under its own timeout.

pub mod app_token;
pub mod delegated;
pub mod error;
pub mod fetcher;
pub mod orchestrator;
pub mod resource;
pub mod token;

pub use app_token::{AppTokenCache, CachedToken};
pub use delegated::DelegatedTokenExchanger;
pub use error::{AppTokenError, BrokerError, ExchangeError};
pub use fetcher::{NormalizedOutcome, ResourceFetcher};
pub use orchestrator::{BrokeredOutcome, ResourceBroker, TokenPath};
pub use resource::Resource;
pub use token::AccessToken;
