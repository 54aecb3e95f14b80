// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity Broker - Bearer Token Verification & Delegated Resource Access
//!
//! Verifies bearer tokens issued by an identity realm and brokers access to
//! an upstream directory API on the caller's behalf, preferring the caller's
//! delegated token and falling back to an application-level credential.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Realm token verification, key resolution, role gating
//! - `broker` - Delegated exchange, application token cache, resource fetch
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod state;

#[cfg(test)]
mod test_support;
