//! In-Memory Stores
//!
//! Process-local implementations for single-instance deployments and tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kernel::id::UserId;

use crate::application::oauth::OAuthStateStore;
use crate::domain::entity::user::User;
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{email::Email, lookup_id::LookupId, totp_secret::TotpSecret};
use crate::error::{AuthError, AuthResult};

// ============================================================================
// Credential store
// ============================================================================

/// Users keyed by lookup id. Email uniqueness is checked under the write
/// lock so concurrent creates cannot both succeed.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing uniqueness checks
    pub fn insert(&self, user: User) -> User {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.lookup_id.as_str().to_string(), user.clone());
        user
    }

    /// Current stored copy
    pub fn snapshot(&self, lookup_id: &LookupId) -> Option<User> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(lookup_id.as_str())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn get_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.values().find(|u| u.email == *email).cloned())
    }

    async fn get_by_lookup_id(&self, lookup_id: &LookupId) -> AuthResult<Option<User>> {
        Ok(self.snapshot(lookup_id))
    }

    async fn create(&self, user: &User) -> AuthResult<User> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let taken = users.contains_key(user.lookup_id.as_str())
            || users.values().any(|u| u.email == user.email);
        if taken {
            return Err(AuthError::UserAlreadyExists);
        }
        users.insert(user.lookup_id.as_str().to_string(), user.clone());
        Ok(user.clone())
    }

    async fn update_totp_secret(&self, id: &UserId, secret: &TotpSecret) -> AuthResult<bool> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users
            .values_mut()
            .find(|u| u.id == *id)
            .ok_or(AuthError::UserNotFound)?;
        if user.totp_secret.is_some() {
            return Ok(false);
        }
        user.totp_secret = Some(secret.clone());
        Ok(true)
    }
}

// ============================================================================
// OAuth state store
// ============================================================================

/// State values with their expiry
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: DashMap<String, DateTime<Utc>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.states.len();
        self.states.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.states.len())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl OAuthStateStore for MemoryStateStore {
    async fn set(&self, state: &str, expires_at: DateTime<Utc>) -> AuthResult<()> {
        self.states.insert(state.to_string(), expires_at);
        Ok(())
    }

    async fn validate(&self, state: &str) -> AuthResult<bool> {
        Ok(self
            .states
            .get(state)
            .is_some_and(|expires_at| *expires_at > Utc::now()))
    }

    async fn remove(&self, state: &str) -> AuthResult<()> {
        self.states.remove(state);
        Ok(())
    }

    async fn consume(&self, state: &str) -> AuthResult<bool> {
        // `remove` is the atomic step: only one caller gets the entry back
        Ok(self
            .states
            .remove(state)
            .is_some_and(|(_, expires_at)| expires_at > Utc::now()))
    }
}
