//! Sign Up Use Case
//!
//! Creates a new email/password account.

use std::sync::Arc;

use crate::application::{config::IdentityConfig, store_call};
use crate::domain::entity::user::User;
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{
    email::Email, lookup_id::LookupId, user_password::NewPassword,
};
use crate::error::{AuthError, AuthResult};

/// Sign up input
pub struct SignUpInput {
    pub email: String,
    pub password: String,
}

/// Sign up output
#[derive(Debug)]
pub struct SignUpOutput {
    pub lookup_id: LookupId,
    pub user: User,
}

/// Sign up use case
pub struct SignUpUseCase<S>
where
    S: CredentialStore,
{
    store: Arc<S>,
    config: Arc<IdentityConfig>,
}

impl<S> SignUpUseCase<S>
where
    S: CredentialStore,
{
    pub fn new(store: Arc<S>, config: Arc<IdentityConfig>) -> Self {
        Self { store, config }
    }

    pub async fn execute(&self, input: SignUpInput) -> AuthResult<SignUpOutput> {
        let timeout = self.config.store_timeout;

        // Normalize and validate email
        let email = Email::parse(&input.email)?;

        // Check if email is taken
        if store_call(timeout, self.store.get_by_email(&email))
            .await?
            .is_some()
        {
            return Err(AuthError::UserAlreadyExists);
        }

        // Validate and hash password
        let password = NewPassword::new(input.password)?.hash()?;

        // Persist; a concurrent registration surfaces as a store conflict
        let user = store_call(timeout, self.store.create(&User::with_password(email, password)))
            .await?;

        tracing::info!(lookup_id = %user.lookup_id, "User signed up");

        Ok(SignUpOutput {
            lookup_id: user.lookup_id.clone(),
            user,
        })
    }
}
