//! Infrastructure Layer
//!
//! Database implementations and external service integrations.

pub mod google;
pub mod memory;
pub mod postgres;
pub mod sinks;

pub use google::GoogleOAuthProvider;
pub use memory::{MemoryCredentialStore, MemoryStateStore};
pub use postgres::PgCredentialStore;
pub use sinks::{LogMailer, TracingAuditSink};
