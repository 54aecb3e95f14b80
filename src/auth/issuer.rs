// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Accepted token issuers.
//!
//! Realms are reachable under two URL shapes depending on the server
//! distribution: `<base>/realms/<realm>` and the legacy
//! `<base>/auth/realms/<realm>`. Both are accepted unless an explicit issuer
//! is configured, in which case only that exact string is.
//!
//! Candidates are built from the configured base URL text, not its parsed
//! form, so `https://SSO.example.com:443` stays exactly that.

use crate::config::RealmConfig;

/// Ordered, immutable set of acceptable `iss` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerCandidates(Vec<String>);

impl IssuerCandidates {
    pub fn from_realm(realm: &RealmConfig) -> Self {
        if let Some(issuer) = &realm.issuer_override {
            return Self(vec![issuer.clone()]);
        }

        let base = &realm.issuer_base;
        Self(vec![
            format!("{base}/realms/{}", realm.realm),
            format!("{base}/auth/realms/{}", realm.realm),
        ])
    }

    /// Exact, case-sensitive membership test.
    pub fn contains(&self, issuer: &str) -> bool {
        self.0.iter().any(|candidate| candidate == issuer)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn realm(base: &str, issuer_override: Option<&str>) -> RealmConfig {
        RealmConfig {
            base_url: Url::parse(base).unwrap(),
            issuer_base: base.trim_end_matches('/').to_string(),
            realm: "imt".to_string(),
            issuer_override: issuer_override.map(str::to_string),
            audience: None,
            idp_alias: "azure".to_string(),
        }
    }

    #[test]
    fn derives_modern_and_legacy_shapes() {
        let issuers = IssuerCandidates::from_realm(&realm("https://sso.example.com/", None));
        assert_eq!(
            issuers.as_slice(),
            &[
                "https://sso.example.com/realms/imt".to_string(),
                "https://sso.example.com/auth/realms/imt".to_string(),
            ]
        );
    }

    #[test]
    fn configured_host_case_and_port_are_kept() {
        let issuers = IssuerCandidates::from_realm(&realm("https://SSO.example.com:443", None));
        assert_eq!(
            issuers.as_slice(),
            &[
                "https://SSO.example.com:443/realms/imt".to_string(),
                "https://SSO.example.com:443/auth/realms/imt".to_string(),
            ]
        );
    }

    #[test]
    fn override_replaces_derived_candidates() {
        let issuers = IssuerCandidates::from_realm(&realm(
            "https://sso.example.com",
            Some("https://id.example.com/custom"),
        ));
        assert_eq!(issuers.to_vec(), vec!["https://id.example.com/custom".to_string()]);
    }

    #[test]
    fn membership_is_exact_and_case_sensitive() {
        let issuers = IssuerCandidates::from_realm(&realm("https://sso.example.com", None));
        assert!(issuers.contains("https://sso.example.com/realms/imt"));
        assert!(!issuers.contains("https://sso.example.com/realms/IMT"));
        assert!(!issuers.contains("https://sso.example.com/realms/imt/"));
    }
}
