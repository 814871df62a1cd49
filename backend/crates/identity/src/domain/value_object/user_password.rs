//! User Password Value Object
//!
//! Domain wrappers around `platform::password`: a policy-checked new
//! password and the stored Argon2id hash.

use std::fmt;

use platform::password::{ClearTextPassword, HashedPassword};

use crate::error::{AuthError, AuthResult};

/// A password chosen at registration, already policy-checked
pub struct NewPassword(ClearTextPassword);

impl NewPassword {
    /// ## Errors
    /// `WeakPassword` with the violated rule
    pub fn new(raw: String) -> AuthResult<Self> {
        Ok(Self(ClearTextPassword::new(raw)?))
    }

    pub fn hash(&self) -> AuthResult<UserPassword> {
        Ok(UserPassword(self.0.hash()?))
    }
}

impl fmt::Debug for NewPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NewPassword").field(&"[REDACTED]").finish()
    }
}

/// Stored Argon2id hash (PHC string)
#[derive(Clone, PartialEq, Eq)]
pub struct UserPassword(HashedPassword);

impl UserPassword {
    /// Create from PHC string (from database)
    pub fn from_phc_string(phc: impl Into<String>) -> AuthResult<Self> {
        HashedPassword::from_phc_string(phc)
            .map(Self)
            .map_err(|_| AuthError::Internal("Invalid password hash in store".to_string()))
    }

    pub fn as_phc_string(&self) -> &str {
        self.0.as_phc_string()
    }

    /// Check a presented password. No policy is applied to `presented`.
    pub fn verify(&self, presented: String) -> bool {
        self.0.verify(&ClearTextPassword::for_verification(presented))
    }
}

impl fmt::Debug for UserPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPassword")
            .field("hash", &"[HASH]")
            .finish()
    }
}
