//! Role Authorization Gate
//!
//! Set membership of the token's role in a route's allow-set. Roles have no
//! hierarchy: an admin-only route does not admit moderators, and a route
//! that admits admins and users says so explicitly.

use crate::domain::entity::session_claims::SessionClaims;
use crate::domain::value_object::user_role::UserRole;
use crate::error::AuthError;

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingRole,
    InvalidRoleFormat,
    InsufficientPrivilege,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl From<DenyReason> for AuthError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::MissingRole => AuthError::MissingRole,
            DenyReason::InvalidRoleFormat => AuthError::InvalidRoleFormat,
            DenyReason::InsufficientPrivilege => AuthError::InsufficientPrivilege,
        }
    }
}

/// Explicit allow-set declared by a protected surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSet {
    user: bool,
    moderator: bool,
    admin: bool,
}

impl RoleSet {
    pub const fn none() -> Self {
        Self {
            user: false,
            moderator: false,
            admin: false,
        }
    }

    pub const fn with(mut self, role: UserRole) -> Self {
        match role {
            UserRole::User => self.user = true,
            UserRole::Moderator => self.moderator = true,
            UserRole::Admin => self.admin = true,
        }
        self
    }

    pub const fn admin_only() -> Self {
        Self::none().with(UserRole::Admin)
    }

    pub fn of(roles: &[UserRole]) -> Self {
        roles.iter().fold(Self::none(), |set, role| set.with(*role))
    }

    pub const fn contains(&self, role: UserRole) -> bool {
        match role {
            UserRole::User => self.user,
            UserRole::Moderator => self.moderator,
            UserRole::Admin => self.admin,
        }
    }
}

/// Pure decision over the claim set.
pub fn authorize(claims: &SessionClaims, allowed: &RoleSet) -> AccessDecision {
    let Some(code) = claims.role.as_deref() else {
        return AccessDecision::Deny(DenyReason::MissingRole);
    };
    match UserRole::parse(code) {
        None => AccessDecision::Deny(DenyReason::InvalidRoleFormat),
        Some(role) if allowed.contains(role) => AccessDecision::Allow,
        Some(_) => AccessDecision::Deny(DenyReason::InsufficientPrivilege),
    }
}
