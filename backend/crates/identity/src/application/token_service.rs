//! Token Service
//!
//! Issues and verifies HS256 session tokens. Stateless: a token is valid
//! iff its signature checks out under the server secret and it has not
//! expired. There is no revocation list.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind as JwtErrorKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::config::IdentityConfig;
use crate::domain::entity::session_claims::SessionClaims;
use crate::domain::value_object::{lookup_id::LookupId, user_role::UserRole};
use crate::error::{AuthError, AuthResult};

/// Claims as written
#[derive(Serialize)]
struct IssuedClaims<'a> {
    #[serde(rename = "lookupID")]
    lookup_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    iat: i64,
    exp: i64,
}

/// Claims as read: every custom field is loosely typed so that a token from
/// an older issuer decodes and is judged field by field.
#[derive(Deserialize)]
struct ReceivedClaims {
    #[serde(rename = "lookupID", default)]
    lookup_id: Option<Value>,
    #[serde(default)]
    role: Option<Value>,
    #[serde(default)]
    iat: i64,
    exp: i64,
}

impl ReceivedClaims {
    fn into_session_claims(self) -> AuthResult<SessionClaims> {
        let lookup_id = match self.lookup_id {
            Some(Value::String(raw)) => LookupId::parse(&raw),
            _ => None,
        }
        .ok_or(AuthError::ClaimMissing)?;

        Ok(SessionClaims {
            lookup_id,
            role: self.role.and_then(normalize_role_claim),
            issued_at: self.iat,
            expires_at: self.exp,
        })
    }
}

/// String roles pass through; numeric roles go through the legacy map;
/// any other JSON shape keeps its text so the gate rejects it as malformed.
fn normalize_role_claim(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(code) => Some(code),
        Value::Number(n) => Some(
            n.as_f64()
                .map(UserRole::legacy_code)
                .unwrap_or("unknown")
                .to_string(),
        ),
        other => Some(other.to_string()),
    }
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(&config.jwt_secret, config.session_ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signed token for `lookup_id`, valid for the configured lifetime.
    pub fn issue(&self, lookup_id: &LookupId, role: Option<UserRole>) -> AuthResult<String> {
        self.issue_at(lookup_id, role, Utc::now().timestamp())
    }

    pub(crate) fn issue_at(
        &self,
        lookup_id: &LookupId,
        role: Option<UserRole>,
        issued_at: i64,
    ) -> AuthResult<String> {
        let claims = IssuedClaims {
            lookup_id: lookup_id.as_str(),
            role: role.as_ref().map(UserRole::code),
            iat: issued_at,
            exp: issued_at + self.ttl.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign session token: {e}")))
    }

    /// Check signature and expiry, then validate the claim shape.
    ///
    /// ## Errors
    /// - `ExpiredToken` past `exp`
    /// - `InvalidToken` for a bad signature, wrong algorithm, or garbage
    /// - `ClaimMissing` when `lookupID` is absent, empty, or not a string
    pub fn verify(&self, token: &str) -> AuthResult<SessionClaims> {
        let data = decode::<ReceivedClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })?;

        data.claims.into_session_claims()
    }
}
