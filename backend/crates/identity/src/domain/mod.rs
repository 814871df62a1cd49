//! Domain Layer
//!
//! Entities, value objects, and the capability traits the core consumes.

pub mod entity;
pub mod repository;
pub mod value_object;

pub use entity::{session_claims::SessionClaims, user::User};
pub use repository::CredentialStore;
