//! PostgreSQL Credential Store

use chrono::{DateTime, Utc};
use kernel::error::conversions::is_unique_violation;
use kernel::id::UserId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::user::User;
use crate::domain::repository::CredentialStore;
use crate::domain::value_object::{
    auth_provider::AuthProvider, email::Email, lookup_id::LookupId, totp_secret::TotpSecret,
    user_password::UserPassword, user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

const USER_COLUMNS: &str = r#"
    id,
    lookup_id,
    email,
    password_hash,
    role,
    provider,
    provider_id,
    display_name,
    avatar_url,
    totp_secret,
    email_verified,
    created_at
"#;

/// PostgreSQL-backed credential store
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for PgCredentialStore {
    async fn get_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn get_by_lookup_id(&self, lookup_id: &LookupId) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lookup_id = $1"
        ))
        .bind(lookup_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn create(&self, user: &User) -> AuthResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (
                id,
                lookup_id,
                email,
                password_hash,
                role,
                provider,
                provider_id,
                display_name,
                avatar_url,
                totp_secret,
                email_verified,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id.as_uuid())
        .bind(user.lookup_id.as_str())
        .bind(user.email.as_str())
        .bind(user.password.as_ref().map(|p| p.as_phc_string()))
        .bind(user.role.code())
        .bind(user.provider.code())
        .bind(user.provider_id.as_deref())
        .bind(user.display_name.as_deref())
        .bind(user.avatar_url.as_deref())
        .bind(user.totp_secret.as_ref().map(|s| s.as_base32()))
        .bind(user.email_verified)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::UserAlreadyExists
            } else {
                AuthError::Database(e)
            }
        })?;

        row.into_user()
    }

    async fn update_totp_secret(&self, id: &UserId, secret: &TotpSecret) -> AuthResult<bool> {
        // Only binds when empty; an enrolled secret is never overwritten
        let result = sqlx::query(
            r#"
            UPDATE users
            SET totp_secret = $2
            WHERE id = $1 AND totp_secret IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(secret.as_base32())
        .execute(&self.pool)
        .await?;

        let bound = result.rows_affected() == 1;
        if !bound {
            tracing::debug!(user_id = %id, "TOTP secret not bound (missing user or already enrolled)");
        }

        Ok(bound)
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    lookup_id: String,
    email: String,
    password_hash: Option<String>,
    role: String,
    provider: String,
    provider_id: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
    totp_secret: Option<String>,
    email_verified: bool,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        let lookup_id = LookupId::parse(&self.lookup_id)
            .ok_or_else(|| AuthError::Internal("Empty lookup_id in store".to_string()))?;

        let provider = AuthProvider::parse(&self.provider)
            .ok_or_else(|| AuthError::Internal(format!("Unknown provider: {}", self.provider)))?;

        let password = self
            .password_hash
            .filter(|h| !h.is_empty())
            .map(UserPassword::from_phc_string)
            .transpose()?;

        let totp_secret = self
            .totp_secret
            .filter(|s| !s.is_empty())
            .map(TotpSecret::from_base32)
            .transpose()?;

        Ok(User {
            id: UserId::from_uuid(self.id),
            lookup_id,
            email: Email::from_db(self.email),
            password,
            role: UserRole::parse(&self.role).unwrap_or_default(),
            provider,
            provider_id: self.provider_id,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            totp_secret,
            email_verified: self.email_verified,
            created_at: self.created_at,
        })
    }
}
