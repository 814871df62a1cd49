use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Moderator,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::User, UserRole::Moderator, UserRole::Admin];

    #[inline]
    pub const fn code(&self) -> &'static str {
        use UserRole::*;
        match self {
            User => "user",
            Moderator => "moderator",
            Admin => "admin",
        }
    }

    /// Exact match on the role code; anything else is not a role.
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    /// Numeric role ids carried by tokens from older issuers.
    ///
    /// 1 = user, 5 = moderator, 10 = admin; any other number is kept as
    /// `"unknown"`, which no route allows.
    pub fn legacy_code(id: f64) -> &'static str {
        match id {
            x if x == 1.0 => UserRole::User.code(),
            x if x == 5.0 => UserRole::Moderator.code(),
            x if x == 10.0 => UserRole::Admin.code(),
            _ => "unknown",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
