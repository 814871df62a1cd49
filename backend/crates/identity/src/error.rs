//! Identity Error Types
//!
//! Every failure the identity core can report, each mapped onto the
//! unified `kernel::error::AppError` system at the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::password::PasswordPolicyError;
use thiserror::Error;

use crate::application::config::ConfigError;

/// Identity result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Message shared by every credential failure so that account existence is
/// never revealed.
const CREDENTIALS_REJECTED: &str = "Invalid email or password";

#[derive(Debug, Error)]
pub enum AuthError {
    // ---- token / session ----
    #[error("Session token is malformed or its signature is invalid")]
    InvalidToken,

    #[error("Session token has expired")]
    ExpiredToken,

    #[error("Session token lacks a lookup id claim")]
    ClaimMissing,

    #[error("User not found")]
    UserNotFound,

    // ---- credentials ----
    #[error("Account uses a different sign-in method")]
    IncorrectAuthType,

    #[error("Wrong password")]
    WrongPassword,

    #[error("Password does not meet the policy: {0}")]
    WeakPassword(#[from] PasswordPolicyError),

    #[error("Invalid parameters: {0}")]
    ParamsMismatch(&'static str),

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Too many failed attempts")]
    TooManyAttempts,

    // ---- OAuth ----
    #[error("OAuth state is missing, expired, or already used")]
    InvalidState,

    #[error("OAuth code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("OAuth profile fetch failed: {0}")]
    ProfileFetchFailed(String),

    #[error("Provider reports the email as unverified")]
    EmailNotVerified,

    // ---- authorization ----
    #[error("Missing role in token")]
    MissingRole,

    #[error("Invalid role format")]
    InvalidRoleFormat,

    #[error("Insufficient role privileges")]
    InsufficientPrivilege,

    /// Admin lookup found nothing; only reachable behind the admin gate
    #[error("No user matches the lookup")]
    NoMatchingUser,

    // ---- second factor ----
    #[error("Second factor is not enrolled")]
    TotpNotEnrolled,

    #[error("Invalid one-time code")]
    InvalidTotpCode,

    // ---- infrastructure ----
    #[error("Credential store timed out")]
    StoreTimeout,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        use AuthError::*;
        match self {
            InvalidToken | ExpiredToken | ClaimMissing | UserNotFound | WrongPassword
            | InvalidTotpCode => ErrorKind::Unauthorized,
            IncorrectAuthType | WeakPassword(_) | ParamsMismatch(_) | InvalidState
            | TotpNotEnrolled => ErrorKind::BadRequest,
            UserAlreadyExists => ErrorKind::Conflict,
            NoMatchingUser => ErrorKind::NotFound,
            TooManyAttempts => ErrorKind::TooManyRequests,
            EmailNotVerified | MissingRole | InvalidRoleFormat | InsufficientPrivilege => {
                ErrorKind::Forbidden
            }
            ExchangeFailed(_) | ProfileFetchFailed(_) => ErrorKind::BadGateway,
            StoreTimeout => ErrorKind::ServiceUnavailable,
            Database(_) | Config(_) | Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// True for the three role-gate denials
    pub fn is_authorization_denial(&self) -> bool {
        matches!(
            self,
            AuthError::MissingRole | AuthError::InvalidRoleFormat | AuthError::InsufficientPrivilege
        )
    }

    /// Convert to AppError with the client-facing message
    pub fn to_app_error(&self) -> AppError {
        use AuthError::*;
        let err = AppError::new(self.kind(), self.public_message());
        match self {
            IncorrectAuthType => {
                err.with_action("Sign in with the method you originally registered with")
            }
            InvalidState | ExchangeFailed(_) | ProfileFetchFailed(_) => {
                err.with_action("Start the sign-in flow again")
            }
            ExpiredToken => err.with_action("Please sign in again"),
            TotpNotEnrolled => err.with_action("Enroll an authenticator app first"),
            _ => err,
        }
    }

    fn public_message(&self) -> String {
        use AuthError::*;
        match self {
            UserNotFound | WrongPassword => CREDENTIALS_REJECTED.to_string(),
            InvalidToken | ClaimMissing => "Authentication required".to_string(),
            ExchangeFailed(_) => "Could not complete sign-in with the provider".to_string(),
            ProfileFetchFailed(_) => "Could not read the provider profile".to_string(),
            StoreTimeout | Database(_) | Config(_) | Internal(_) => {
                self.kind().as_str().to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Identity database error");
            }
            AuthError::StoreTimeout => {
                tracing::error!("Credential store timed out");
            }
            AuthError::Config(e) => {
                tracing::error!(error = %e, "Identity configuration error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Identity internal error");
            }
            AuthError::ExchangeFailed(reason) | AuthError::ProfileFetchFailed(reason) => {
                tracing::warn!(error = %self, reason = %reason, "OAuth flow failed");
            }
            AuthError::WrongPassword
            | AuthError::UserNotFound
            | AuthError::InvalidTotpCode
            | AuthError::TooManyAttempts => {
                tracing::warn!(error = %self, "Rejected credentials");
            }
            e if e.is_authorization_denial() => {
                tracing::warn!(reason = %e, "Authorization denied");
            }
            _ => {
                tracing::debug!(error = %self, "Identity error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<platform::password::PasswordHashError> for AuthError {
    fn from(err: platform::password::PasswordHashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<platform::rate_limit::AttemptError> for AuthError {
    fn from(err: platform::rate_limit::AttemptError) -> Self {
        match err {
            platform::rate_limit::AttemptError::Exhausted { .. } => AuthError::TooManyAttempts,
            platform::rate_limit::AttemptError::Backend(msg) => AuthError::Internal(msg),
        }
    }
}
