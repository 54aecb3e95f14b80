// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Broker errors.
//!
//! Resource-level results (not found, unauthorized, upstream error) are not
//! errors; see [`NormalizedOutcome`](super::NormalizedOutcome). The types
//! here cover failing to obtain an upstream token at all.

/// Failure of the delegated token exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// The broker endpoint does not exist: delegation is not enabled for
    /// this identity-provider alias.
    #[error("token exchange endpoint not found")]
    EndpointNotFound,

    #[error("token exchange rejected with HTTP {status}")]
    Rejected { status: u16, body: String },

    #[error("token exchange response carried no access token")]
    MissingAccessToken,

    #[error("token exchange timed out")]
    Timeout,

    #[error("token exchange request failed: {0}")]
    Transport(String),
}

impl ExchangeError {
    /// Needs operator action rather than being part of the expected path.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, ExchangeError::EndpointNotFound)
    }
}

/// Failure to acquire the application-level token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppTokenError {
    #[error("application credentials are not configured")]
    NotConfigured,

    #[error("client credentials rejected with HTTP {status}")]
    CredentialRejected { status: u16, body: String },

    #[error("token endpoint failed with HTTP {status}")]
    Upstream { status: u16, body: String },

    #[error("token endpoint response carried no access token")]
    MissingAccessToken,

    #[error("client credentials grant timed out")]
    Timeout,

    #[error("client credentials request failed: {0}")]
    Transport(String),
}

impl AppTokenError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppTokenError::Upstream { .. } | AppTokenError::Timeout | AppTokenError::Transport(_)
        )
    }

    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            AppTokenError::NotConfigured | AppTokenError::CredentialRejected { .. }
        )
    }
}

/// The fallback chain ended without any resource outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Delegation failed and the caller has no directory key to address
    /// them on the application path.
    #[error("delegated access failed: {0}")]
    Delegation(ExchangeError),

    /// Delegation failed, then the application token could not be acquired.
    #[error("application token unavailable: {0}")]
    AppToken(AppTokenError),
}

impl BrokerError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BrokerError::Delegation(ExchangeError::Timeout)
                | BrokerError::AppToken(AppTokenError::Timeout)
        )
    }
}
