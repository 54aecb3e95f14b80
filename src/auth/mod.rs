// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Verifies bearer tokens issued by the identity realm.
//!
//! ## Auth Flow
//!
//! 1. The browser session library obtains a realm access token
//! 2. The frontend sends `Authorization: Bearer <token>`
//! 3. This service:
//!    - Checks `iss` against the accepted issuer shapes
//!    - Resolves the signing key by `kid` from the realm JWKS (cached)
//!    - Verifies signature, expiry (60s skew by default) and audience
//!    - Attaches the [`VerifiedIdentity`] to the request
//!
//! ## Security
//!
//! - Only the configured asymmetric algorithms are accepted; `none` and
//!   HMAC tokens are refused
//! - Key-set refetches are rate limited against unknown-`kid` floods
//! - Issuer mismatches echo the accepted issuers, which are public values

pub mod claims;
pub mod error;
pub mod extractor;
pub mod issuer;
pub mod jwks;
pub mod middleware;
pub mod roles;
pub mod verifier;

pub use claims::{Audience, VerifiedIdentity};
pub use error::AuthError;
pub use extractor::Identity;
pub use issuer::IssuerCandidates;
pub use jwks::{KeyResolveError, KeyResolver, SigningKey};
pub use roles::RealmRoles;
pub use verifier::TokenVerifier;
