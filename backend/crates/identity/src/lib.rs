//! Identity & Session Resolution
//!
//! Clean Architecture structure:
//! - `domain/` - User entity, value objects, claims, store traits
//! - `application/` - Token service, identity cache, session resolver,
//!   OAuth reconciliation, TOTP second factor, role gate, use cases
//! - `infra/` - PostgreSQL and in-memory stores, Google provider, log sinks
//! - `presentation/` - HTTP handlers, middleware, DTOs, router
//!
//! ## Security Model
//! - Stateless HS256 session tokens carrying only the opaque lookup id
//! - Bounded LRU identity cache in front of the credential store
//! - One account, one authentication method: providers never merge
//! - Optional TOTP second factor, proven by a short-lived signed marker

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

pub use application::config::{ConfigError, IdentityConfig};
pub use error::{AuthError, AuthResult};
pub use presentation::router::identity_router;
pub use presentation::state::{Backend, IdentityState, ProductionBackend};
