//! Shared Kernel - Domain-crossing minimal core
//!
//! This crate contains the vocabulary every backend crate agrees on:
//! - Common error types and result aliases
//! - Typed identifiers backed by UUIDs
//!
//! Anything identity-specific belongs in the `identity` crate.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
