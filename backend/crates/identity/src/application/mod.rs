//! Application Layer
//!
//! Identity services and use cases.

use std::future::Future;
use std::time::Duration;

use crate::error::{AuthError, AuthResult};

pub mod background;
pub mod config;
pub mod identity_cache;
pub mod oauth;
pub mod role_gate;
pub mod second_factor;
pub mod session_resolver;
pub mod sign_in;
pub mod sign_up;
pub mod token_service;

// Re-exports
pub use background::{AuditEvent, AuditSink, BackgroundDispatcher, BackgroundJob, MailMessage, Mailer};
pub use config::{ConfigError, IdentityConfig};
pub use identity_cache::IdentityCache;
pub use oauth::{CallbackParams, OAuthProvider, OAuthReconciler, OAuthStateStore};
pub use role_gate::{AccessDecision, DenyReason, RoleSet, authorize};
pub use second_factor::{SecondFactor, SecondFactorMarker, SecondFactorState};
pub use session_resolver::{ResolvedSession, SessionResolver};
pub use sign_in::{SignInInput, SignInOutput, SignInUseCase};
pub use sign_up::{SignUpInput, SignUpOutput, SignUpUseCase};
pub use token_service::TokenService;

/// Run a credential-store call under a deadline. Dropping the future on
/// timeout abandons the query; it is never retried here.
pub(crate) async fn store_call<T, F>(limit: Duration, call: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| AuthError::StoreTimeout)?
}
