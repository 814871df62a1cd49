//! Value Object Module

pub mod auth_provider;
pub mod email;
pub mod lookup_id;
pub mod totp_secret;
pub mod user_password;
pub mod user_role;
