//! Presentation Layer
//!
//! HTTP handlers, DTOs, router, and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use middleware::{CurrentSession, audit_admin, require_roles, require_session};
pub use router::identity_router;
pub use state::{Backend, IdentityState, ProductionBackend};
