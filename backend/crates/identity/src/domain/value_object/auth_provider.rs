//! Authentication Provider
//!
//! The method that created an account. Fixed at creation.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Email + password
    Email,
    Google,
    Discord,
}

impl AuthProvider {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            AuthProvider::Email => "email",
            AuthProvider::Google => "google",
            AuthProvider::Discord => "discord",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "email" => Some(AuthProvider::Email),
            "google" => Some(AuthProvider::Google),
            "discord" => Some(AuthProvider::Discord),
            _ => None,
        }
    }

    /// Whether accounts of this provider carry a password hash
    #[inline]
    pub const fn uses_password(&self) -> bool {
        matches!(self, AuthProvider::Email)
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
