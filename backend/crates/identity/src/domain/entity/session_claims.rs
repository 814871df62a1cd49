//! Session Claims
//!
//! The fixed, validated claim set carried by a session token.

use chrono::{DateTime, TimeZone, Utc};

use crate::domain::value_object::{lookup_id::LookupId, user_role::UserRole};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub lookup_id: LookupId,
    /// Normalized role claim as text, or `None` when the token had none.
    ///
    /// Kept as text so the role gate can tell an unknown role apart from a
    /// missing one.
    pub role: Option<String>,
    /// Seconds since the Unix epoch
    pub issued_at: i64,
    /// Seconds since the Unix epoch
    pub expires_at: i64,
}

impl SessionClaims {
    /// Role used for identity purposes: absent means `user`.
    ///
    /// `None` when a role claim is present but names no known role.
    pub fn effective_role(&self) -> Option<UserRole> {
        match &self.role {
            None => Some(UserRole::User),
            Some(code) => UserRole::parse(code),
        }
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires_at, 0).single()
    }
}
