//! Store Traits
//!
//! The credential store is an external collaborator; the core only ever
//! calls these verbs. Implementations live in the infrastructure layer.

use kernel::id::UserId;

use crate::domain::entity::user::User;
use crate::domain::value_object::{email::Email, lookup_id::LookupId, totp_secret::TotpSecret};
use crate::error::AuthResult;

/// Credential store adapter
#[trait_variant::make(CredentialStore: Send)]
pub trait LocalCredentialStore {
    /// Find user by normalized email
    async fn get_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    /// Find user by public lookup id
    async fn get_by_lookup_id(&self, lookup_id: &LookupId) -> AuthResult<Option<User>>;

    /// Insert a new user.
    ///
    /// ## Errors
    /// `UserAlreadyExists` when the email (or lookup id) is taken.
    async fn create(&self, user: &User) -> AuthResult<User>;

    /// Bind a TOTP secret to the account if it has none.
    ///
    /// Returns `false` when a secret was already bound; the stored one is
    /// kept.
    async fn update_totp_secret(&self, id: &UserId, secret: &TotpSecret) -> AuthResult<bool>;
}
