//! Log-backed sinks for background jobs.

use crate::application::background::{AuditEvent, AuditSink, MailMessage, Mailer};
use crate::error::AuthResult;

/// Writes each audit event as one structured record on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> AuthResult<()> {
        tracing::info!(
            target: "audit",
            event_id = %event.id,
            request_id = %event.request_id,
            admin_lookup_id = %event.admin_lookup_id,
            admin_email = %event.admin_email,
            action = %event.action,
            resource = %event.resource,
            target_user = %event.target_user,
            method = %event.method,
            path = %event.path,
            status = event.status,
            latency_ms = event.latency_ms,
            client_ip = ?event.client_ip,
            user_agent = event.user_agent.as_deref().unwrap_or("-"),
            "Admin access"
        );
        Ok(())
    }
}

/// Logs outbound mail instead of delivering it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> AuthResult<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "Mail dispatched"
        );
        Ok(())
    }
}
