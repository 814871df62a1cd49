//! TOTP Secret Value Object
//!
//! Base32-encoded shared secret for an authenticator app. Set once at
//! enrollment and kept for the lifetime of the account.

use std::fmt;

use totp_rs::Secret;

use crate::error::{AuthError, AuthResult};

#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret {
    base32: String,
}

impl TotpSecret {
    /// New random 160-bit secret
    pub fn generate() -> Self {
        Self {
            base32: Secret::generate_secret().to_encoded().to_string(),
        }
    }

    /// Create from a stored base32 string, checking it decodes
    pub fn from_base32(secret: impl Into<String>) -> AuthResult<Self> {
        let base32 = secret.into();
        Secret::Encoded(base32.clone())
            .to_bytes()
            .map_err(|e| AuthError::Internal(format!("Invalid TOTP secret: {e:?}")))?;
        Ok(Self { base32 })
    }

    /// Create from raw key bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            base32: Secret::Raw(bytes.to_vec()).to_encoded().to_string(),
        }
    }

    pub fn as_base32(&self) -> &str {
        &self.base32
    }

    pub fn to_bytes(&self) -> AuthResult<Vec<u8>> {
        Secret::Encoded(self.base32.clone())
            .to_bytes()
            .map_err(|e| AuthError::Internal(format!("Invalid TOTP secret: {e:?}")))
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TotpSecret").field(&"[REDACTED]").finish()
    }
}
