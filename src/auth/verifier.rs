// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! ## Steps
//!
//! 1. Extract the token from `Authorization: Bearer <token>`
//! 2. Decode header and claims without checking the signature, to read
//!    `kid` and `iss`
//! 3. Check `iss` against the accepted issuers by exact string match
//! 4. Resolve the signing key for `kid` and verify the signature using only
//!    the configured asymmetric algorithms
//! 5. Check expiry with the configured clock skew tolerance
//! 6. Check the audience, if one is configured
//!
//! Failures are terminal for the request; nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::debug;

use super::claims::{AccessTokenClaims, UnverifiedClaims, VerifiedIdentity};
use super::issuer::IssuerCandidates;
use super::jwks::{KeyResolveError, KeyResolver};
use super::AuthError;

pub struct TokenVerifier {
    issuers: IssuerCandidates,
    audience: Option<String>,
    algorithms: Vec<Algorithm>,
    clock_skew: Duration,
    keys: Arc<KeyResolver>,
}

impl TokenVerifier {
    pub fn new(
        issuers: IssuerCandidates,
        audience: Option<String>,
        algorithms: Vec<Algorithm>,
        clock_skew: Duration,
        keys: Arc<KeyResolver>,
    ) -> Self {
        Self {
            issuers,
            audience,
            algorithms,
            clock_skew,
            keys,
        }
    }

    pub fn issuers(&self) -> &IssuerCandidates {
        &self.issuers
    }

    pub fn keys(&self) -> &Arc<KeyResolver> {
        &self.keys
    }

    /// Verify an `Authorization` header value and build the caller identity.
    pub async fn verify(&self, authorization: &str) -> Result<VerifiedIdentity, AuthError> {
        let token = bearer_token(authorization).ok_or(AuthError::MissingBearer)?;

        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        let unverified = jsonwebtoken::dangerous::insecure_decode::<UnverifiedClaims>(token)
            .map_err(|_| AuthError::MalformedToken)?
            .claims;

        match unverified.iss.as_deref() {
            Some(iss) if self.issuers.contains(iss) => {}
            received => {
                return Err(AuthError::IssuerMismatch {
                    expected: self.issuers.to_vec(),
                    received: received.map(str::to_string),
                })
            }
        }

        let kid = header.kid.as_deref().ok_or(AuthError::MalformedToken)?;
        if !self.algorithms.contains(&header.alg) {
            debug!(alg = ?header.alg, "Rejecting token signed with a non-accepted algorithm");
            return Err(AuthError::SignatureInvalid);
        }

        let key = self.keys.resolve(kid).await.map_err(|e| match e {
            KeyResolveError::KeyNotFound(_) => AuthError::SignatureInvalid,
            KeyResolveError::UpstreamUnavailable(reason) => AuthError::KeysUnavailable(reason),
        })?;
        if key.algorithm.is_some_and(|pinned| pinned != header.alg) {
            return Err(AuthError::SignatureInvalid);
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = vec![header.alg];
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_issuer(self.issuers.as_slice());
        validation.set_required_spec_claims(&["exp", "iss"]);

        let claims = decode::<AccessTokenClaims>(token, &key.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidIssuer => AuthError::IssuerMismatch {
                    expected: self.issuers.to_vec(),
                    received: unverified.iss.clone(),
                },
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidKeyFormat => AuthError::SignatureInvalid,
                _ => AuthError::MalformedToken,
            })?
            .claims;

        if let Some(expected) = &self.audience {
            if !claims.aud.contains(expected) {
                return Err(AuthError::AudienceMismatch {
                    expected: expected.clone(),
                    received: claims.aud.to_vec(),
                });
            }
        }

        Ok(VerifiedIdentity::from_claims(claims, token))
    }
}

/// The token part of a `Bearer <token>` header value. The scheme is matched
/// case-insensitively.
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
