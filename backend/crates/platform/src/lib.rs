//! Platform Crate - Technical Infrastructure
//!
//! Primitives with no identity semantics of their own:
//! - Cryptographic helpers (HMAC-SHA256, base64url, random tokens)
//! - Password hashing (Argon2id) and password policy
//! - Cookie building and extraction
//! - Client address and user agent extraction
//! - Attempt limiting (failed login / code counters)

pub mod client;
pub mod cookie;
pub mod crypto;
pub mod password;
pub mod rate_limit;
