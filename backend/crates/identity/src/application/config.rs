//! Application Configuration
//!
//! Built once at startup from the environment and shared by `Arc`.
//! A missing required value aborts startup.

use std::fmt;
use std::time::Duration;

use platform::rate_limit::AttemptPolicy;
use thiserror::Error;

/// Session token lifetime
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
/// Second-factor marker lifetime
pub const SECOND_FACTOR_TTL: Duration = Duration::from_secs(3600);
/// OAuth state lifetime
pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);
/// Identity cache capacity
pub const CACHE_CAPACITY: usize = 256;
/// Bound on store queries and provider calls
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_TOTP_ISSUER: &str = "Community";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is missing or empty")]
    Missing(&'static str),

    #[error("environment variable {key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Google OAuth client registration
#[derive(Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl fmt::Debug for GoogleOAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct IdentityConfig {
    /// HS256 signing key for session tokens (JWT_SECRET)
    pub jwt_secret: Vec<u8>,
    pub google: GoogleOAuthConfig,
    /// Key for server-signed session-store values (OAUTH_KEY)
    pub session_store_key: Vec<u8>,
    /// `Secure` attribute on cookies (PROD=true)
    pub cookie_secure: bool,
    pub totp_issuer: String,
    /// Recipient of admin-access notices
    pub admin_notify_email: Option<String>,
    pub bind_addr: String,
    pub frontend_origins: Vec<String>,
    pub session_ttl: Duration,
    pub second_factor_ttl: Duration,
    pub oauth_state_ttl: Duration,
    pub cache_capacity: usize,
    pub store_timeout: Duration,
    pub profile_timeout: Duration,
    pub attempt_policy: AttemptPolicy,
}

impl IdentityConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment, a map in tests)
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));

        let jwt_secret = required("JWT_SECRET")?.into_bytes();
        let google = GoogleOAuthConfig {
            client_id: required("OAUTH_GOOGLE_CLIENT")?,
            client_secret: required("OAUTH_GOOGLE_SECRET")?,
            redirect_url: required("GOOGLE_REDIRECT")?,
        };
        let session_store_key = required("OAUTH_KEY")?.into_bytes();

        let cookie_secure = optional("PROD")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);

        let max_failures = optional("LOGIN_MAX_FAILURES")
            .map(|v| {
                v.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                    key: "LOGIN_MAX_FAILURES",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            jwt_secret,
            google,
            session_store_key,
            cookie_secure,
            totp_issuer: optional("TOTP_ISSUER").unwrap_or_else(|| DEFAULT_TOTP_ISSUER.to_string()),
            admin_notify_email: optional("ADMIN_NOTIFY_EMAIL"),
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            frontend_origins: optional("FRONTEND_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            session_ttl: SESSION_TTL,
            second_factor_ttl: SECOND_FACTOR_TTL,
            oauth_state_ttl: OAUTH_STATE_TTL,
            cache_capacity: CACHE_CAPACITY,
            store_timeout: IO_TIMEOUT,
            profile_timeout: IO_TIMEOUT,
            attempt_policy: AttemptPolicy {
                max_failures,
                ..AttemptPolicy::default()
            },
        })
    }

    /// Fixed secrets, insecure cookies; for tests only
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let vars = std::collections::HashMap::from([
            ("JWT_SECRET", "test-jwt-secret"),
            ("OAUTH_GOOGLE_CLIENT", "client-id"),
            ("OAUTH_GOOGLE_SECRET", "client-secret"),
            ("GOOGLE_REDIRECT", "http://localhost:3000/api/oauth/google/callback"),
            ("OAUTH_KEY", "test-session-store-key"),
        ]);
        match Self::from_source(|k| vars.get(k).map(|v| v.to_string())) {
            Ok(config) => config,
            Err(e) => panic!("test config: {e}"),
        }
    }
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("google", &self.google)
            .field("session_store_key", &"[REDACTED]")
            .field("cookie_secure", &self.cookie_secure)
            .field("totp_issuer", &self.totp_issuer)
            .field("admin_notify_email", &self.admin_notify_email)
            .field("bind_addr", &self.bind_addr)
            .field("frontend_origins", &self.frontend_origins)
            .field("session_ttl", &self.session_ttl)
            .field("cache_capacity", &self.cache_capacity)
            .finish_non_exhaustive()
    }
}
