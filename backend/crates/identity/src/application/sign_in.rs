//! Sign In Use Case
//!
//! Verifies an email/password pair and issues a session token. The second
//! factor is reported, not enforced: the caller decides which surfaces
//! require the marker.

use std::sync::Arc;

use platform::rate_limit::AttemptLimiter;

use crate::application::{
    config::IdentityConfig, second_factor::SecondFactorState, store_call,
    token_service::TokenService,
};
use crate::domain::entity::user::User;
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{auth_provider::AuthProvider, email::Email};
use crate::error::{AuthError, AuthResult};

/// Sign in input
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

/// Sign in output
#[derive(Debug)]
pub struct SignInOutput {
    /// Session token for cookie and body
    pub token: String,
    pub user: User,
    pub second_factor: SecondFactorState,
}

/// Sign in use case
pub struct SignInUseCase<S, L>
where
    S: CredentialStore,
    L: AttemptLimiter,
{
    store: Arc<S>,
    limiter: Arc<L>,
    tokens: Arc<TokenService>,
    config: Arc<IdentityConfig>,
}

impl<S, L> SignInUseCase<S, L>
where
    S: CredentialStore,
    L: AttemptLimiter,
{
    pub fn new(
        store: Arc<S>,
        limiter: Arc<L>,
        tokens: Arc<TokenService>,
        config: Arc<IdentityConfig>,
    ) -> Self {
        Self {
            store,
            limiter,
            tokens,
            config,
        }
    }

    pub async fn execute(&self, input: SignInInput) -> AuthResult<SignInOutput> {
        let email = Email::parse(&input.email)?;
        if input.password.is_empty() {
            return Err(AuthError::ParamsMismatch("password is required"));
        }

        let attempt_key = format!("login:{email}");
        self.limiter.check(&attempt_key).await?;

        let Some(user) = store_call(
            self.config.store_timeout,
            self.store.get_by_email(&email),
        )
        .await?
        else {
            self.limiter.record_failure(&attempt_key).await?;
            return Err(AuthError::UserNotFound);
        };

        // Accounts created through a provider have no password to check
        if user.provider != AuthProvider::Email {
            return Err(AuthError::IncorrectAuthType);
        }
        let Some(hash) = user.password.as_ref() else {
            return Err(AuthError::IncorrectAuthType);
        };

        if !hash.verify(input.password) {
            let failures = self.limiter.record_failure(&attempt_key).await?;
            tracing::warn!(lookup_id = %user.lookup_id, failures, "Password rejected");
            return Err(AuthError::WrongPassword);
        }
        self.limiter.reset(&attempt_key).await?;

        let token = self.tokens.issue(&user.lookup_id, Some(user.role))?;
        let second_factor = SecondFactorState::after_password(&user);

        tracing::info!(
            lookup_id = %user.lookup_id,
            second_factor = ?second_factor,
            "User signed in"
        );

        Ok(SignInOutput {
            token,
            user,
            second_factor,
        })
    }
}
