// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Realm-level roles for authorization.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::AuthError;

/// Roles granted to the caller at realm level (`realm_access.roles`).
///
/// Role names are compared exactly; realms treat them as opaque strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealmRoles(BTreeSet<String>);

impl RealmRoles {
    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    /// True when any of `required` is held. An empty requirement always passes.
    pub fn has_any<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.is_empty() || required.iter().any(|r| self.contains(r.as_ref()))
    }

    /// Like [`has_any`](Self::has_any), but produces the 403 rejection.
    pub fn require_any<S: AsRef<str>>(&self, required: &[S]) -> Result<(), AuthError> {
        if self.has_any(required) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole {
                required: required.iter().map(|r| r.as_ref().to_string()).collect(),
            })
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for RealmRoles {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
