//! TOTP Second Factor
//!
//! Enrollment binds a secret to the account once; validation accepts the
//! code for the current 30 s step and one step either side. A satisfied
//! second factor is recorded in its own signed marker, separate from the
//! session token.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use platform::crypto;
use platform::rate_limit::AttemptLimiter;
use serde::Serialize;
use totp_rs::{Algorithm, TOTP};
use url::form_urlencoded::byte_serialize;

use crate::application::{config::IdentityConfig, identity_cache::IdentityCache, store_call};
use crate::domain::entity::user::User;
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{email::Email, lookup_id::LookupId, totp_secret::TotpSecret};
use crate::error::{AuthError, AuthResult};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;

// ============================================================================
// State
// ============================================================================

/// Where a password-verified login stands with respect to the second factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SecondFactorState {
    /// No secret bound yet
    EnrollmentRequired,
    /// Secret bound; a code is expected
    AwaitingCode,
    Authenticated,
    Rejected,
}

impl SecondFactorState {
    /// State right after the password check
    pub fn after_password(user: &User) -> Self {
        if user.is_totp_enrolled() {
            Self::AwaitingCode
        } else {
            Self::EnrollmentRequired
        }
    }

    pub fn after_code(accepted: bool) -> Self {
        if accepted {
            Self::Authenticated
        } else {
            Self::Rejected
        }
    }
}

// ============================================================================
// Marker
// ============================================================================

/// Signed `<lookupID>.<expiry_ms>.<sig>` value proving a satisfied second
/// factor for one account until expiry.
#[derive(Clone)]
pub struct SecondFactorMarker {
    key: Vec<u8>,
    ttl: Duration,
}

impl SecondFactorMarker {
    pub fn new(key: &[u8], ttl: Duration) -> Self {
        Self {
            key: key.to_vec(),
            ttl,
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(&config.session_store_key, config.second_factor_ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, lookup_id: &LookupId) -> AuthResult<String> {
        self.issue_at(lookup_id, Utc::now().timestamp_millis())
    }

    pub(crate) fn issue_at(&self, lookup_id: &LookupId, now_ms: i64) -> AuthResult<String> {
        let ttl_ms = i64::try_from(self.ttl.as_millis())
            .map_err(|_| AuthError::Internal("marker ttl out of range".to_string()))?;
        let payload = format!("{}.{}", lookup_id, now_ms.saturating_add(ttl_ms));
        let tag = crypto::hmac_sha256(&self.key, payload.as_bytes())
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(format!("{payload}.{}", crypto::to_base64_url(&tag)))
    }

    /// Signature valid, unexpired, and issued for `lookup_id`
    pub fn verify(&self, marker: &str, lookup_id: &LookupId) -> bool {
        self.verify_at(marker, lookup_id, Utc::now().timestamp_millis())
    }

    pub(crate) fn verify_at(&self, marker: &str, lookup_id: &LookupId, now_ms: i64) -> bool {
        // lookup ids never contain '.', so split from the right
        let Some((payload, sig)) = marker.rsplit_once('.') else {
            return false;
        };
        let Some((owner, expiry)) = payload.rsplit_once('.') else {
            return false;
        };
        let Ok(tag) = crypto::from_base64_url(sig) else {
            return false;
        };
        if !crypto::verify_hmac_sha256(&self.key, payload.as_bytes(), &tag) {
            return false;
        }
        let Ok(expiry_ms) = expiry.parse::<i64>() else {
            return false;
        };
        owner == lookup_id.as_str() && now_ms < expiry_ms
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct SecondFactor<S, L>
where
    S: CredentialStore,
    L: AttemptLimiter,
{
    store: Arc<S>,
    cache: Arc<IdentityCache>,
    limiter: Arc<L>,
    marker: SecondFactorMarker,
    config: Arc<IdentityConfig>,
}

impl<S, L> SecondFactor<S, L>
where
    S: CredentialStore,
    L: AttemptLimiter,
{
    pub fn new(
        store: Arc<S>,
        cache: Arc<IdentityCache>,
        limiter: Arc<L>,
        config: Arc<IdentityConfig>,
    ) -> Self {
        Self {
            store,
            cache,
            limiter,
            marker: SecondFactorMarker::from_config(&config),
            config,
        }
    }

    pub fn marker(&self) -> &SecondFactorMarker {
        &self.marker
    }

    /// Bind a secret to the account, or return the one already bound.
    ///
    /// The record is re-read from the store so a stale cached copy can
    /// never cause an authenticator app's secret to be overwritten.
    pub async fn enroll(&self, user: &User) -> AuthResult<TotpSecret> {
        let timeout = self.config.store_timeout;
        let current = store_call(timeout, self.store.get_by_lookup_id(&user.lookup_id))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(existing) = current.totp_secret {
            tracing::debug!(lookup_id = %user.lookup_id, "Second factor already enrolled");
            return Ok(existing);
        }

        let secret = TotpSecret::generate();
        let bound =
            store_call(timeout, self.store.update_totp_secret(&current.id, &secret)).await?;
        self.cache.invalidate(&user.lookup_id);

        if bound {
            tracing::info!(lookup_id = %user.lookup_id, "Second factor enrolled");
            return Ok(secret);
        }

        // A concurrent enrollment bound its secret first; hand that one back
        let stored = store_call(timeout, self.store.get_by_lookup_id(&user.lookup_id))
            .await?
            .ok_or(AuthError::UserNotFound)?;
        stored.totp_secret.ok_or_else(|| {
            AuthError::Internal("TOTP secret neither bound nor present".to_string())
        })
    }

    /// `otpauth://totp/<issuer>:<email>?secret=<secret>&issuer=<issuer>`
    pub fn enrollment_uri(&self, email: &Email, secret: &TotpSecret) -> String {
        let issuer: String = byte_serialize(self.config.totp_issuer.as_bytes()).collect();
        let account: String = byte_serialize(email.as_str().as_bytes()).collect();
        format!(
            "otpauth://totp/{issuer}:{account}?secret={}&issuer={issuer}",
            secret.as_base32()
        )
    }

    /// Base64 PNG QR code for the enrollment artifact
    pub fn qr_base64(&self, email: &Email, secret: &TotpSecret) -> AuthResult<String> {
        self.totp(secret, email)?
            .get_qr_base64()
            .map_err(|e| AuthError::Internal(format!("QR generation failed: {e}")))
    }

    /// Check `code` against the current time
    pub fn validate_code(&self, user: &User, code: &str) -> AuthResult<bool> {
        let now = u64::try_from(Utc::now().timestamp())
            .map_err(|_| AuthError::Internal("clock before epoch".to_string()))?;
        self.validate_code_at(user, code, now)
    }

    pub fn validate_code_at(&self, user: &User, code: &str, unix_secs: u64) -> AuthResult<bool> {
        let secret = user.totp_secret.as_ref().ok_or(AuthError::TotpNotEnrolled)?;
        let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }
        Ok(self.totp(secret, &user.email)?.check(&code, unix_secs))
    }

    /// Validate under the attempt limiter and issue the marker on success.
    ///
    /// ## Errors
    /// `TotpNotEnrolled`, `InvalidTotpCode`, `TooManyAttempts`
    pub async fn satisfy(&self, user: &User, code: &str) -> AuthResult<String> {
        let key = format!("totp:{}", user.lookup_id);
        self.limiter.check(&key).await?;

        if !self.validate_code(user, code)? {
            let failures = self.limiter.record_failure(&key).await?;
            tracing::warn!(lookup_id = %user.lookup_id, failures, "Second factor rejected");
            return Err(AuthError::InvalidTotpCode);
        }

        self.limiter.reset(&key).await?;
        tracing::info!(lookup_id = %user.lookup_id, "Second factor satisfied");
        self.marker.issue(&user.lookup_id)
    }

    fn totp(&self, secret: &TotpSecret, email: &Email) -> AuthResult<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECS,
            secret.to_bytes()?,
            Some(self.config.totp_issuer.clone()),
            email.as_str().to_string(),
        )
        .map_err(|e| AuthError::Internal(format!("TOTP setup failed: {e}")))
    }
}
