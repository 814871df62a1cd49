//! Identity Router

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::application::RoleSet;
use crate::presentation::handlers;
use crate::presentation::middleware::{audit_admin, require_roles, require_session};
use crate::presentation::state::{Backend, IdentityState};

/// All identity routes under `/api`
pub fn identity_router<B: Backend>(state: IdentityState<B>) -> Router {
    let public = Router::new()
        .route("/api/users/register", post(handlers::register::<B>))
        .route("/api/users/login", post(handlers::login::<B>))
        .route("/api/oauth/google/login", get(handlers::oauth_login::<B>))
        .route("/api/oauth/google/callback", get(handlers::oauth_callback::<B>));

    let authenticated = Router::new()
        .route("/api/users/profile", get(handlers::profile))
        .route("/api/two/enroll", post(handlers::two_enroll::<B>))
        .route("/api/two/validate", post(handlers::two_validate::<B>))
        .route("/api/two/status", get(handlers::two_status::<B>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session::<B>,
        ));

    // Layers run last-added first: session, then role gate, then audit
    let admin = Router::new()
        .route("/api/admin/profile", get(handlers::admin_profile::<B>))
        .route("/api/admin/users/{lookup_id}", get(handlers::admin_get_user::<B>))
        .route("/api/admin/search", post(handlers::admin_search::<B>))
        .route_layer(middleware::from_fn_with_state(
            state.dispatcher.clone(),
            audit_admin,
        ))
        .route_layer(middleware::from_fn_with_state(
            RoleSet::admin_only(),
            require_roles,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session::<B>,
        ));

    public.merge(authenticated).merge(admin).with_state(state)
}
