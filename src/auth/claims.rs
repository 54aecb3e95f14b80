// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the verified caller identity.

use std::collections::BTreeSet;

use serde::Deserialize;

use super::roles::RealmRoles;

/// The `aud` claim normalized into a set.
///
/// Realms emit it as a single string, a space-delimited string, or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audience(BTreeSet<String>);

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        self.0.contains(audience)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Audience {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawAudience {
            One(String),
            Many(Vec<String>),
        }

        let values = match Option::<RawAudience>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(RawAudience::One(s)) => vec![s],
            Some(RawAudience::Many(v)) => v,
        };
        Ok(Self(
            values
                .iter()
                .flat_map(|v| v.split_whitespace())
                .map(str::to_string)
                .collect(),
        ))
    }
}

/// Claims read before the signature is checked, for issuer diagnostics.
#[derive(Debug, Deserialize)]
pub(crate) struct UnverifiedClaims {
    #[serde(default)]
    pub iss: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RealmAccess {
    #[serde(default)]
    pub roles: RealmRoles,
}

/// Access token claims as issued by the realm.
#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    pub iss: String,
    #[serde(default)]
    pub aud: Audience,
    pub exp: u64,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Directory object id mapped from the upstream identity provider.
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

/// Decoded, signature-checked claims for one request.
///
/// Created once by the verifier and read-only afterwards. Carries the raw
/// token so the broker can exchange it for a delegated upstream token.
#[derive(Clone)]
pub struct VerifiedIdentity {
    /// Absent when the realm omits `sub` (no `basic` client scope).
    pub subject: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub directory_id: Option<String>,
    pub issuer: String,
    pub audience: Audience,
    pub realm_roles: RealmRoles,
    /// Unix seconds
    pub expires_at: u64,
    raw_token: String,
}

impl VerifiedIdentity {
    pub(crate) fn from_claims(claims: AccessTokenClaims, raw_token: &str) -> Self {
        Self {
            subject: claims.sub.filter(|s| !s.is_empty()),
            username: claims.preferred_username,
            email: claims.email,
            display_name: claims.name,
            directory_id: claims.oid,
            issuer: claims.iss,
            audience: claims.aud,
            realm_roles: claims.realm_access.unwrap_or_default().roles,
            expires_at: claims.exp,
            raw_token: raw_token.to_string(),
        }
    }

    /// The caller's own bearer token.
    pub fn raw_token(&self) -> &str {
        &self.raw_token
    }

    /// Key for addressing this caller in the resource directory without the
    /// `me` shorthand: the directory id if mapped, else username, else email.
    pub fn directory_lookup_key(&self) -> Option<&str> {
        self.directory_id
            .as_deref()
            .or(self.username.as_deref())
            .or(self.email.as_deref())
            .filter(|k| !k.is_empty())
    }
}

impl std::fmt::Debug for VerifiedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedIdentity")
            .field("subject", &self.subject)
            .field("username", &self.username)
            .field("issuer", &self.issuer)
            .field("realm_roles", &self.realm_roles)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_identity(raw_token: &str) -> VerifiedIdentity {
    VerifiedIdentity {
        subject: Some("f3a1c2d4-0000-4000-8000-000000000001".to_string()),
        username: Some("ana@contoso.com".to_string()),
        email: Some("ana@contoso.com".to_string()),
        display_name: Some("Ana".to_string()),
        directory_id: None,
        issuer: "https://sso.example.com/realms/imt".to_string(),
        audience: Audience::default(),
        realm_roles: RealmRoles::default(),
        expires_at: 0,
        raw_token: raw_token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aud(json: &str) -> Audience {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(default)]
            aud: Audience,
        }
        serde_json::from_str::<Wrapper>(json).unwrap().aud
    }

    #[test]
    fn audience_accepts_single_string() {
        assert!(aud(r#"{"aud":"account"}"#).contains("account"));
    }

    #[test]
    fn audience_splits_space_delimited_string() {
        let a = aud(r#"{"aud":"account portal-api"}"#);
        assert!(a.contains("account"));
        assert!(a.contains("portal-api"));
    }

    #[test]
    fn audience_accepts_list() {
        let a = aud(r#"{"aud":["account","portal-api"]}"#);
        assert_eq!(a.to_vec(), vec!["account".to_string(), "portal-api".to_string()]);
    }

    #[test]
    fn audience_absent_or_null_is_empty() {
        assert!(aud(r#"{}"#).is_empty());
        assert!(aud(r#"{"aud":null}"#).is_empty());
    }

    #[test]
    fn lookup_key_prefers_directory_id() {
        let mut identity = test_identity("t");
        assert_eq!(identity.directory_lookup_key(), Some("ana@contoso.com"));
        identity.directory_id = Some("5d3e0b3c-oid".to_string());
        assert_eq!(identity.directory_lookup_key(), Some("5d3e0b3c-oid"));
        identity.directory_id = None;
        identity.username = None;
        identity.email = None;
        assert_eq!(identity.directory_lookup_key(), None);
    }

    #[test]
    fn debug_output_omits_raw_token() {
        let identity = test_identity("eyJ.secret.token");
        assert!(!format!("{identity:?}").contains("secret"));
    }
}
