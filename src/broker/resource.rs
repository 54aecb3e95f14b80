// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resource kinds and their URLs on each token path.
//!
//! The delegated token acts as the caller, so it addresses them as `me`. The
//! application token acts as the service and must name the user explicitly.

use url::Url;

const PROFILE_QUERY: &str = "$select=displayName,jobTitle,department,mail,mobilePhone,officeLocation,userPrincipalName&$expand=manager($select=displayName,mail)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// The caller's directory profile, with their manager expanded.
    Profile,
    /// The caller's profile photo.
    Photo,
    /// Another user's profile photo.
    UserPhoto { user: String },
}

impl Resource {
    /// URL used with the caller's delegated token.
    pub fn delegated_url(&self, base: &Url) -> Url {
        match self {
            Resource::Profile => with_query(join(base, &["me"]), PROFILE_QUERY),
            Resource::Photo => join(base, &["me", "photo", "$value"]),
            Resource::UserPhoto { user } => join(base, &["users", user, "photo", "$value"]),
        }
    }

    /// URL used with the application token, addressing the caller by
    /// `lookup` (directory id, username or email).
    pub fn application_url(&self, base: &Url, lookup: &str) -> Url {
        match self {
            Resource::Profile => with_query(join(base, &["users", lookup]), PROFILE_QUERY),
            Resource::Photo => join(base, &["users", lookup, "photo", "$value"]),
            Resource::UserPhoto { user } => join(base, &["users", user, "photo", "$value"]),
        }
    }

    /// Whether the application path needs the caller's lookup key.
    pub fn needs_caller_lookup(&self) -> bool {
        !matches!(self, Resource::UserPhoto { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Resource::Profile => "profile",
            Resource::Photo => "photo",
            Resource::UserPhoto { .. } => "user_photo",
        }
    }
}

fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn with_query(mut url: Url, query: &str) -> Url {
    url.set_query(Some(query));
    url
}
