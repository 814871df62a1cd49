//! Background Dispatch
//!
//! Fire-and-forget work decoupled from the request path: admin audit events
//! and notification mail. Submission never awaits; a full queue drops the
//! job with a warning, and sink failures are logged by the worker.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::Method;
use kernel::id::AuditEventId;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::AuthResult;

/// Default queue depth
pub const DISPATCH_CAPACITY: usize = 1024;

const UNKNOWN: &str = "unknown";

// ============================================================================
// Jobs
// ============================================================================

/// One admin request, as recorded for auditing
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    #[serde(serialize_with = "serialize_id")]
    pub id: AuditEventId,
    pub request_id: String,
    pub admin_lookup_id: String,
    pub admin_email: String,
    pub action: String,
    pub resource: String,
    pub target_user: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: u64,
    pub client_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

fn serialize_id<S: serde::Serializer>(id: &AuditEventId, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(id)
}

impl AuditEvent {
    /// VIEW / CREATE / UPDATE / DELETE, else the method name itself
    pub fn action_for(method: &Method) -> String {
        match method.as_str() {
            "GET" => "VIEW",
            "POST" => "CREATE",
            "PUT" | "PATCH" => "UPDATE",
            "DELETE" => "DELETE",
            other => other,
        }
        .to_string()
    }

    /// Path segment following `admin`
    pub fn resource_from_path(path: &str) -> String {
        segment_after(path, "admin").unwrap_or(UNKNOWN).to_string()
    }

    /// `/users/<id>` path segment, else a `user_id` / `target_user_id`
    /// query parameter
    pub fn target_from(path: &str, query: Option<&str>) -> String {
        if let Some(id) = segment_after(path, "users") {
            return id.to_string();
        }
        query
            .and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, v)| (k == "user_id" || k == "target_user_id") && !v.is_empty())
                    .map(|(_, v)| v.into_owned())
            })
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// `req_<nanos>_<8 random chars>`
    pub fn new_request_id() -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let token = platform::crypto::random_token();
        format!("req_{nanos}_{}", &token[..8])
    }
}

fn segment_after<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments.by_ref().find(|s| *s == marker)?;
    segments.next()
}

/// Outbound notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub enum BackgroundJob {
    Audit(Box<AuditEvent>),
    Mail(MailMessage),
}

impl BackgroundJob {
    fn label(&self) -> &'static str {
        match self {
            Self::Audit(_) => "audit",
            Self::Mail(_) => "mail",
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

#[trait_variant::make(AuditSink: Send)]
pub trait LocalAuditSink {
    async fn record(&self, event: &AuditEvent) -> AuthResult<()>;
}

#[trait_variant::make(Mailer: Send)]
pub trait LocalMailer {
    async fn send(&self, message: &MailMessage) -> AuthResult<()>;
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Cloneable submission handle; the worker stops once every handle is
/// dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct BackgroundDispatcher {
    sender: mpsc::Sender<BackgroundJob>,
}

impl BackgroundDispatcher {
    /// Start the worker on the current runtime
    pub fn spawn<A, M>(sink: Arc<A>, mailer: Arc<M>, capacity: usize) -> (Self, JoinHandle<()>)
    where
        A: AuditSink + Sync + 'static,
        M: Mailer + Sync + 'static,
    {
        let (dispatcher, inbox) = Self::channel(capacity);
        let worker = tokio::spawn(run_worker(inbox, sink, mailer));
        (dispatcher, worker)
    }

    /// Handle plus raw receiver, for callers that drive the queue themselves
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BackgroundJob>) {
        let (sender, inbox) = mpsc::channel(capacity.max(1));
        (Self { sender }, inbox)
    }

    /// Queue a job without waiting. Returns `false` when it was dropped.
    pub fn submit(&self, job: BackgroundJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(job = job.label(), "Background queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(job = job.label(), "Background worker stopped, dropping job");
                false
            }
        }
    }

    pub fn audit(&self, event: AuditEvent) -> bool {
        self.submit(BackgroundJob::Audit(Box::new(event)))
    }

    pub fn mail(&self, message: MailMessage) -> bool {
        self.submit(BackgroundJob::Mail(message))
    }
}

async fn run_worker<A, M>(mut inbox: mpsc::Receiver<BackgroundJob>, sink: Arc<A>, mailer: Arc<M>)
where
    A: AuditSink + Sync,
    M: Mailer + Sync,
{
    while let Some(job) = inbox.recv().await {
        let result = match &job {
            BackgroundJob::Audit(event) => sink.record(event).await,
            BackgroundJob::Mail(message) => mailer.send(message).await,
        };
        if let Err(e) = result {
            tracing::error!(job = job.label(), error = %e, "Background job failed");
        }
    }
    tracing::debug!("Background worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::AuthError;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl AuditSink for RecordingSink {
        async fn record(&self, event: &AuditEvent) -> AuthResult<()> {
            self.events.lock().unwrap().push(event.request_id.clone());
            Ok(())
        }
    }

    struct FailingMailer;

    impl Mailer for FailingMailer {
        async fn send(&self, _message: &MailMessage) -> AuthResult<()> {
            Err(AuthError::Internal("smtp down".to_string()))
        }
    }

    fn event(request_id: &str) -> AuditEvent {
        AuditEvent {
            id: AuditEventId::new(),
            request_id: request_id.to_string(),
            admin_lookup_id: "L1".to_string(),
            admin_email: "admin@b.com".to_string(),
            action: "VIEW".to_string(),
            resource: "profile".to_string(),
            target_user: UNKNOWN.to_string(),
            method: "GET".to_string(),
            path: "/api/admin/profile".to_string(),
            status: 200,
            latency_ms: 3,
            client_ip: None,
            user_agent: None,
            occurred_at: Utc::now(),
        }
    }

    fn mail() -> MailMessage {
        MailMessage {
            to: "ops@b.com".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        }
    }

    #[tokio::test]
    async fn test_worker_drains_and_survives_failures() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) =
            BackgroundDispatcher::spawn(sink.clone(), Arc::new(FailingMailer), 8);

        assert!(dispatcher.audit(event("r1")));
        assert!(dispatcher.mail(mail()));
        assert!(dispatcher.audit(event("r2")));

        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(*sink.events.lock().unwrap(), vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (dispatcher, mut inbox) = BackgroundDispatcher::channel(1);

        assert!(dispatcher.mail(mail()));
        assert!(!dispatcher.mail(mail()));

        assert!(inbox.recv().await.is_some());
        assert!(dispatcher.mail(mail()));
    }

    #[tokio::test]
    async fn test_closed_queue_drops() {
        let (dispatcher, inbox) = BackgroundDispatcher::channel(4);
        drop(inbox);
        assert!(!dispatcher.audit(event("r1")));
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(AuditEvent::action_for(&Method::GET), "VIEW");
        assert_eq!(AuditEvent::action_for(&Method::POST), "CREATE");
        assert_eq!(AuditEvent::action_for(&Method::PUT), "UPDATE");
        assert_eq!(AuditEvent::action_for(&Method::PATCH), "UPDATE");
        assert_eq!(AuditEvent::action_for(&Method::DELETE), "DELETE");
        assert_eq!(AuditEvent::action_for(&Method::OPTIONS), "OPTIONS");
    }

    #[test]
    fn test_resource_and_target() {
        assert_eq!(AuditEvent::resource_from_path("/api/admin/users/L9"), "users");
        assert_eq!(AuditEvent::resource_from_path("/api/admin"), "unknown");
        assert_eq!(AuditEvent::resource_from_path("/api/other"), "unknown");

        assert_eq!(AuditEvent::target_from("/api/admin/users/L9", None), "L9");
        assert_eq!(
            AuditEvent::target_from("/api/admin/search", Some("user_id=L3&x=1")),
            "L3"
        );
        assert_eq!(
            AuditEvent::target_from("/api/admin/search", Some("target_user_id=L4")),
            "L4"
        );
        assert_eq!(AuditEvent::target_from("/api/admin/profile", None), "unknown");
    }

    #[test]
    fn test_request_id_shape() {
        let id = AuditEvent::new_request_id();
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts[0], "req");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
    }
}
