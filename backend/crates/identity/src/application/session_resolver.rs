//! Session Resolver
//!
//! Token -> claims -> cached or stored user. The only path by which a
//! request acquires an identity.

use std::sync::Arc;
use std::time::Duration;

use crate::application::{identity_cache::IdentityCache, store_call, token_service::TokenService};
use crate::domain::entity::{session_claims::SessionClaims, user::User};
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::lookup_id::LookupId;
use crate::error::{AuthError, AuthResult};

/// A verified token and the user it names
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub claims: SessionClaims,
    pub user: User,
}

pub struct SessionResolver<S>
where
    S: CredentialStore,
{
    tokens: Arc<TokenService>,
    cache: Arc<IdentityCache>,
    store: Arc<S>,
    store_timeout: Duration,
}

impl<S> SessionResolver<S>
where
    S: CredentialStore,
{
    pub fn new(
        tokens: Arc<TokenService>,
        cache: Arc<IdentityCache>,
        store: Arc<S>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            cache,
            store,
            store_timeout,
        }
    }

    /// ## Errors
    /// `InvalidToken`, `ExpiredToken`, `ClaimMissing` from verification;
    /// `UserNotFound` when the account no longer exists; `StoreTimeout`.
    pub async fn resolve(&self, token: &str) -> AuthResult<ResolvedSession> {
        let claims = self.tokens.verify(token)?;
        let user = self.load(&claims.lookup_id).await?;
        Ok(ResolvedSession { claims, user })
    }

    /// Cache first; on a miss, fetch from the store and fill the cache.
    pub async fn load(&self, lookup_id: &LookupId) -> AuthResult<User> {
        if let Some(user) = self.cache.get(lookup_id) {
            tracing::debug!(lookup_id = %lookup_id, "Identity cache hit");
            return Ok(user);
        }
        tracing::debug!(lookup_id = %lookup_id, "Identity cache miss");

        let user = store_call(self.store_timeout, self.store.get_by_lookup_id(lookup_id))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.cache.put(lookup_id.clone(), user.clone());
        Ok(user)
    }
}
