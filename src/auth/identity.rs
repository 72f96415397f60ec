//! Verified caller identity.
//!
//! An [`Identity`] only exists after a token's signature and claims have been
//! checked. Roles and permissions are held as validated newtypes so that
//! free-text claim values never reach authorization or downstream headers.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};

const MAX_NAME_LEN: usize = 64;

/// Role and permission names: ASCII alphanumerics plus `-`, `_`, `:`, `.`.
/// Commas are excluded because the names are joined into header values.
fn is_valid_name(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_NAME_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.'))
}

/// A coarse-grained role, e.g. `admin`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Role(String);

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_name(raw).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fine-grained permission, e.g. `projects:write`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Permission(String);

impl Permission {
    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_name(raw).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authenticated principal behind a request. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub email: Option<String>,
    pub roles: BTreeSet<Role>,
    pub permissions: BTreeSet<Permission>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    /// Comma-separated, sorted role list as sent in `X-User-Roles`.
    pub fn roles_header(&self) -> String {
        join(self.roles.iter().map(Role::as_str))
    }

    /// Comma-separated, sorted permission list as sent in `X-User-Permissions`.
    pub fn permissions_header(&self) -> String {
        join(self.permissions.iter().map(Permission::as_str))
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(",")
}
