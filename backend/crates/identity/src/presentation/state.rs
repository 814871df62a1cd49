//! Shared handler state
//!
//! Every component is built once at startup and shared by `Arc`; handlers
//! assemble the per-request use cases from these parts.

use std::sync::Arc;

use platform::rate_limit::{AttemptLimiter, MemoryAttemptLimiter};

use crate::application::{
    BackgroundDispatcher, IdentityCache, IdentityConfig, OAuthProvider, OAuthReconciler,
    OAuthStateStore, SecondFactor, SessionResolver, SignInUseCase, SignUpUseCase, TokenService,
};
use crate::domain::repository::CredentialStore;
use crate::infra::{GoogleOAuthProvider, MemoryStateStore, PgCredentialStore};

/// The concrete collaborators one deployment wires in
pub trait Backend: Send + Sync + 'static {
    type Store: CredentialStore + Sync + 'static;
    type Provider: OAuthProvider + Sync + 'static;
    type States: OAuthStateStore + Sync + 'static;
    type Limiter: AttemptLimiter + Sync + 'static;
}

/// PostgreSQL users, Google sign-in, process-local state and limiter
pub struct ProductionBackend;

impl Backend for ProductionBackend {
    type Store = PgCredentialStore;
    type Provider = GoogleOAuthProvider;
    type States = MemoryStateStore;
    type Limiter = MemoryAttemptLimiter;
}

pub struct IdentityState<B: Backend> {
    pub config: Arc<IdentityConfig>,
    pub tokens: Arc<TokenService>,
    pub cache: Arc<IdentityCache>,
    pub store: Arc<B::Store>,
    pub provider: Arc<B::Provider>,
    pub states: Arc<B::States>,
    pub limiter: Arc<B::Limiter>,
    pub dispatcher: BackgroundDispatcher,
}

// Manual impl: a derive would require `B: Clone`
impl<B: Backend> Clone for IdentityState<B> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            tokens: self.tokens.clone(),
            cache: self.cache.clone(),
            store: self.store.clone(),
            provider: self.provider.clone(),
            states: self.states.clone(),
            limiter: self.limiter.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<B: Backend> IdentityState<B> {
    /// Token service and identity cache are derived from `config`.
    pub fn new(
        config: IdentityConfig,
        store: Arc<B::Store>,
        provider: Arc<B::Provider>,
        states: Arc<B::States>,
        limiter: Arc<B::Limiter>,
        dispatcher: BackgroundDispatcher,
    ) -> Self {
        let tokens = Arc::new(TokenService::from_config(&config));
        let cache = Arc::new(IdentityCache::new(config.cache_capacity));
        Self {
            config: Arc::new(config),
            tokens,
            cache,
            store,
            provider,
            states,
            limiter,
            dispatcher,
        }
    }

    pub fn resolver(&self) -> SessionResolver<B::Store> {
        SessionResolver::new(
            self.tokens.clone(),
            self.cache.clone(),
            self.store.clone(),
            self.config.store_timeout,
        )
    }

    pub fn reconciler(&self) -> OAuthReconciler<B::Store, B::Provider, B::States> {
        OAuthReconciler::new(
            self.store.clone(),
            self.provider.clone(),
            self.states.clone(),
            self.tokens.clone(),
            self.config.clone(),
        )
    }

    pub fn second_factor(&self) -> SecondFactor<B::Store, B::Limiter> {
        SecondFactor::new(
            self.store.clone(),
            self.cache.clone(),
            self.limiter.clone(),
            self.config.clone(),
        )
    }

    pub fn sign_up(&self) -> SignUpUseCase<B::Store> {
        SignUpUseCase::new(self.store.clone(), self.config.clone())
    }

    pub fn sign_in(&self) -> SignInUseCase<B::Store, B::Limiter> {
        SignInUseCase::new(
            self.store.clone(),
            self.limiter.clone(),
            self.tokens.clone(),
            self.config.clone(),
        )
    }
}
