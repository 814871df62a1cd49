//! User Entity
//!
//! The identity record: who the account is, how it signs in, and whether a
//! second factor is bound to it.

use chrono::{DateTime, Utc};
use kernel::id::UserId;

use crate::domain::value_object::{
    auth_provider::AuthProvider, email::Email, lookup_id::LookupId, totp_secret::TotpSecret,
    user_password::UserPassword, user_role::UserRole,
};

/// Profile data an OAuth provider reports about a signed-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: AuthProvider,
    /// Provider-side account id
    pub provider_id: String,
    pub email: String,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Internal primary key; never leaves the server
    pub id: UserId,
    /// Public identifier embedded in session tokens
    pub lookup_id: LookupId,
    pub email: Email,
    /// Present iff `provider` is `Email`
    pub password: Option<UserPassword>,
    pub role: UserRole,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub totp_secret: Option<TotpSecret>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// New email/password account; email unverified until confirmed.
    pub fn with_password(email: Email, password: UserPassword) -> Self {
        Self {
            id: UserId::new(),
            lookup_id: LookupId::generate(),
            email,
            password: Some(password),
            role: UserRole::default(),
            provider: AuthProvider::Email,
            provider_id: None,
            display_name: None,
            avatar_url: None,
            totp_secret: None,
            email_verified: false,
            created_at: Utc::now(),
        }
    }

    /// New account from a verified provider profile; never has a password.
    pub fn from_provider(email: Email, profile: &ProviderProfile) -> Self {
        Self {
            id: UserId::new(),
            lookup_id: LookupId::generate(),
            email,
            password: None,
            role: UserRole::default(),
            provider: profile.provider,
            provider_id: Some(profile.provider_id.clone()),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            totp_secret: None,
            email_verified: true,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn is_totp_enrolled(&self) -> bool {
        self.totp_secret.is_some()
    }
}
