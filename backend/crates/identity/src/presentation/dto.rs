//! API DTOs (Data Transfer Objects)
//!
//! User JSON never carries the password hash or the TOTP secret.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::SecondFactorState;
use crate::domain::entity::user::User;

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "lookupID")]
    pub lookup_id: String,
    pub email: String,
    pub role: String,
    pub provider: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub totp_enrolled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            lookup_id: user.lookup_id.to_string(),
            email: user.email.to_string(),
            role: user.role.code().to_string(),
            provider: user.provider.code().to_string(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
            email_verified: user.email_verified,
            totp_enrolled: user.is_totp_enrolled(),
            created_at: user.created_at,
        }
    }
}

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Registration response
#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    #[serde(rename = "userID")]
    pub user_id: String,
}

/// Password login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
    pub second_factor: SecondFactorState,
}

#[derive(Debug, Clone, Serialize)]
pub struct OAuthLoginResponse {
    pub token: String,
    pub user: UserResponse,
    pub created: bool,
}

// ============================================================================
// Second factor
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    /// Secret for manual entry
    pub secret: String,
    pub otpauth_url: String,
    /// QR code as a `data:image/png;base64,...` URL
    pub qr_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateCodeRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateCodeResponse {
    pub state: SecondFactorState,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecondFactorStatusResponse {
    pub enrolled: bool,
    pub satisfied: bool,
}

// ============================================================================
// Admin
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AdminSearchRequest {
    pub email: String,
}
