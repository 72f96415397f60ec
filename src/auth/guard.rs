//! Authorization Guard.
//!
//! Roles are any-of, permissions are all-of. A route listing both requires
//! both; a route listing neither admits any authenticated identity.

use std::collections::BTreeSet;

use crate::auth::identity::{Identity, Permission, Role};
use crate::error::GatewayError;

/// What a route demands of an authenticated identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequirement {
    pub roles: BTreeSet<Role>,
    pub permissions: BTreeSet<Permission>,
}

impl AuthRequirement {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.permissions.is_empty()
    }
}

pub fn authorize(identity: &Identity, requirement: &AuthRequirement) -> Result<(), GatewayError> {
    let mut missing: Vec<String> = requirement
        .permissions
        .difference(&identity.permissions)
        .map(|p| format!("permission:{}", p))
        .collect();

    if !requirement.roles.is_empty() && requirement.roles.is_disjoint(&identity.roles) {
        let any_of = requirement
            .roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join("|");
        missing.push(format!("role:{}", any_of));
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::PermissionDenied { missing })
    }
}
