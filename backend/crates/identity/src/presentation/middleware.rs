//! Identity Middleware
//!
//! Layered on protected routes, outermost first: session resolution, role
//! gate, admin audit.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use kernel::id::AuditEventId;
use platform::client::{extract_client_ip, extract_user_agent};
use platform::cookie::{extract_bearer, extract_cookie};

use crate::application::{
    AccessDecision, AuditEvent, BackgroundDispatcher, RoleSet, authorize,
};
use crate::domain::entity::{session_claims::SessionClaims, user::User};
use crate::error::AuthError;
use crate::presentation::handlers::SESSION_COOKIE;
use crate::presentation::state::{Backend, IdentityState};

/// Resolved identity stored in request extensions
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub user: User,
    pub claims: SessionClaims,
}

/// Resolve the session token (`jwt` cookie, then `Authorization: Bearer`)
pub async fn require_session<B: Backend>(
    State(state): State<IdentityState<B>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let headers = req.headers();
    let token = extract_cookie(headers, SESSION_COOKIE)
        .or_else(|| extract_bearer(headers))
        .ok_or(AuthError::InvalidToken)?;

    let resolved = state.resolver().resolve(&token).await?;

    req.extensions_mut().insert(CurrentSession {
        user: resolved.user,
        claims: resolved.claims,
    });

    Ok(next.run(req).await)
}

/// Admit only roles in the layer's allow-set
pub async fn require_roles(
    State(allowed): State<RoleSet>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let session = req
        .extensions()
        .get::<CurrentSession>()
        .ok_or(AuthError::InvalidToken)?;

    if let AccessDecision::Deny(reason) = authorize(&session.claims, &allowed) {
        tracing::debug!(
            lookup_id = %session.user.lookup_id,
            path = %req.uri().path(),
            ?reason,
            "Role gate denied request"
        );
        return Err(reason.into());
    }

    Ok(next.run(req).await)
}

/// Submit one audit event per admin request once the response is ready
pub async fn audit_admin(
    State(dispatcher): State<BackgroundDispatcher>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let direct_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let client_ip = extract_client_ip(req.headers(), direct_ip);
    let user_agent = extract_user_agent(req.headers());

    let admin = req
        .extensions()
        .get::<CurrentSession>()
        .map(|s| (s.user.lookup_id.to_string(), s.user.email.to_string()));

    let response = next.run(req).await;

    let Some((admin_lookup_id, admin_email)) = admin else {
        return response;
    };

    let event = AuditEvent {
        id: AuditEventId::new(),
        request_id: AuditEvent::new_request_id(),
        admin_lookup_id,
        admin_email,
        action: AuditEvent::action_for(&method),
        resource: AuditEvent::resource_from_path(&path),
        target_user: AuditEvent::target_from(&path, query.as_deref()),
        method: method.to_string(),
        path,
        status: response.status().as_u16(),
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        client_ip,
        user_agent,
        occurred_at: Utc::now(),
    };
    dispatcher.audit(event);

    response
}
