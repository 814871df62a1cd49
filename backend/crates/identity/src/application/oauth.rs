//! OAuth Reconciliation
//!
//! Authorization-code login against a third-party provider, reconciled with
//! the credential store under "one account, one sign-in method": an email
//! registered through another method is rejected, never merged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::application::{config::IdentityConfig, store_call, token_service::TokenService};
use crate::domain::entity::user::{ProviderProfile, User};
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{auth_provider::AuthProvider, email::Email};
use crate::error::{AuthError, AuthResult};

// ============================================================================
// Capabilities
// ============================================================================

/// Access token returned by the provider's token endpoint
#[derive(Clone)]
pub struct ProviderToken {
    pub access_token: String,
}

/// One OAuth2 identity provider
#[trait_variant::make(OAuthProvider: Send)]
pub trait LocalOAuthProvider {
    /// Provider family recorded on accounts created through it
    fn kind(&self) -> AuthProvider;

    /// Authorization URL carrying `state`
    fn authorize_url(&self, state: &str) -> String;

    /// ## Errors
    /// `ExchangeFailed`
    async fn exchange_code(&self, code: &str) -> AuthResult<ProviderToken>;

    /// ## Errors
    /// `ProfileFetchFailed`
    async fn fetch_profile(&self, token: &ProviderToken) -> AuthResult<ProviderProfile>;
}

/// Short-lived single-use state values.
///
/// A shared implementation (Redis, a database table) can stand in for the
/// in-memory one in multi-instance deployments.
#[trait_variant::make(OAuthStateStore: Send)]
pub trait LocalOAuthStateStore {
    async fn set(&self, state: &str, expires_at: DateTime<Utc>) -> AuthResult<()>;

    /// Present and unexpired; does not consume
    async fn validate(&self, state: &str) -> AuthResult<bool>;

    async fn remove(&self, state: &str) -> AuthResult<()>;

    /// Atomic check-and-delete: of any number of concurrent callers with the
    /// same state, at most one sees `true`.
    async fn consume(&self, state: &str) -> AuthResult<bool>;
}

// ============================================================================
// Reconciler
// ============================================================================

/// Query parameters of the provider callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a completed login
#[derive(Debug, Clone)]
pub struct OAuthLogin {
    pub user: User,
    pub token: String,
    /// True when this login created the account
    pub created: bool,
}

pub struct OAuthReconciler<S, P, T>
where
    S: CredentialStore,
    P: OAuthProvider,
    T: OAuthStateStore,
{
    store: Arc<S>,
    provider: Arc<P>,
    states: Arc<T>,
    tokens: Arc<TokenService>,
    config: Arc<IdentityConfig>,
}

impl<S, P, T> OAuthReconciler<S, P, T>
where
    S: CredentialStore,
    P: OAuthProvider,
    T: OAuthStateStore,
{
    pub fn new(
        store: Arc<S>,
        provider: Arc<P>,
        states: Arc<T>,
        tokens: Arc<TokenService>,
        config: Arc<IdentityConfig>,
    ) -> Self {
        Self {
            store,
            provider,
            states,
            tokens,
            config,
        }
    }

    /// Returns `(redirect_url, state)`.
    pub async fn begin_login(&self) -> AuthResult<(String, String)> {
        let state = platform::crypto::random_token();
        let ttl = chrono::Duration::from_std(self.config.oauth_state_ttl)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        self.states.set(&state, Utc::now() + ttl).await?;

        let url = self.provider.authorize_url(&state);
        tracing::debug!(provider = %self.provider.kind(), "OAuth login started");
        Ok((url, state))
    }

    pub async fn complete_login(&self, params: CallbackParams) -> AuthResult<OAuthLogin> {
        // 1. single-use state, consumed before anything else
        let state = params.state.as_deref().unwrap_or_default();
        if state.is_empty() || !self.states.consume(state).await? {
            return Err(AuthError::InvalidState);
        }

        if let Some(error) = params.error.filter(|e| !e.is_empty()) {
            return Err(AuthError::ExchangeFailed(format!("provider returned error: {error}")));
        }
        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::ExchangeFailed("callback has no code".to_string()))?;

        // 2. code -> access token
        let access = tokio::time::timeout(
            self.config.profile_timeout,
            self.provider.exchange_code(&code),
        )
        .await
        .map_err(|_| AuthError::ExchangeFailed("token endpoint timed out".to_string()))??;

        // 3. access token -> profile
        let profile = tokio::time::timeout(
            self.config.profile_timeout,
            self.provider.fetch_profile(&access),
        )
        .await
        .map_err(|_| AuthError::ProfileFetchFailed("profile endpoint timed out".to_string()))??;

        // The flow, not the response, names the provider
        let profile = ProviderProfile {
            provider: self.provider.kind(),
            ..profile
        };

        // 4. only provider-verified emails
        if !profile.email_verified {
            return Err(AuthError::EmailNotVerified);
        }
        let email = Email::parse(&profile.email)
            .map_err(|_| AuthError::ProfileFetchFailed("profile email is invalid".to_string()))?;

        // 5. reconcile
        let (user, created) = self.reconcile(email, &profile).await?;

        // 6. session token
        let token = self.tokens.issue(&user.lookup_id, Some(user.role))?;

        tracing::info!(
            lookup_id = %user.lookup_id,
            provider = %profile.provider,
            created,
            "OAuth login completed"
        );

        Ok(OAuthLogin {
            user,
            token,
            created,
        })
    }

    async fn reconcile(&self, email: Email, profile: &ProviderProfile) -> AuthResult<(User, bool)> {
        let timeout = self.config.store_timeout;

        if let Some(existing) = store_call(timeout, self.store.get_by_email(&email)).await? {
            return self.ensure_same_provider(existing).map(|u| (u, false));
        }

        let candidate = User::from_provider(email.clone(), profile);
        match store_call(timeout, self.store.create(&candidate)).await {
            Ok(user) => Ok((user, true)),
            // Lost a race with a concurrent first login for the same email
            Err(AuthError::UserAlreadyExists) => {
                let existing = store_call(timeout, self.store.get_by_email(&email))
                    .await?
                    .ok_or(AuthError::UserAlreadyExists)?;
                self.ensure_same_provider(existing).map(|u| (u, false))
            }
            Err(e) => Err(e),
        }
    }

    fn ensure_same_provider(&self, user: User) -> AuthResult<User> {
        let attempted = self.provider.kind();
        if user.provider != attempted {
            tracing::warn!(
                lookup_id = %user.lookup_id,
                registered = %user.provider,
                %attempted,
                "Sign-in method mismatch"
            );
            return Err(AuthError::IncorrectAuthType);
        }
        Ok(user)
    }
}
