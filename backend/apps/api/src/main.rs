//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request errors are `identity::AuthError`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{self, Method, header};
use identity::application::BackgroundDispatcher;
use identity::application::background::DISPATCH_CAPACITY;
use identity::infra::{
    GoogleOAuthProvider, LogMailer, MemoryStateStore, PgCredentialStore, TracingAuditSink,
};
use identity::{IdentityConfig, IdentityState, ProductionBackend, identity_router};
use platform::rate_limit::MemoryAttemptLimiter;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired OAuth states and attempt windows are swept
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "community_api=info,identity=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Missing secrets are fatal
    let config = IdentityConfig::from_env()?;
    tracing::info!(?config, "Identity configuration loaded");

    // Database connection
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set in environment"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    // Background worker for audit events and mail
    let (dispatcher, _worker) = BackgroundDispatcher::spawn(
        Arc::new(TracingAuditSink),
        Arc::new(LogMailer),
        DISPATCH_CAPACITY,
    );

    let states = Arc::new(MemoryStateStore::new());
    let limiter = Arc::new(MemoryAttemptLimiter::new(config.attempt_policy.clone()));
    spawn_purge(states.clone(), limiter.clone());

    let provider = GoogleOAuthProvider::new(config.google.clone())?;

    // CORS configuration
    let allowed_origins: Vec<http::HeaderValue> = config
        .frontend_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    let addr: SocketAddr = config.bind_addr.parse()?;

    let state = IdentityState::<ProductionBackend>::new(
        config,
        Arc::new(PgCredentialStore::new(pool)),
        Arc::new(provider),
        states,
        limiter,
        dispatcher,
    );

    // Build router
    let app = identity_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Sweep abandoned OAuth states and stale attempt windows so both maps
/// stay bounded
fn spawn_purge(states: Arc<MemoryStateStore>, limiter: Arc<MemoryAttemptLimiter>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = states.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Expired OAuth states removed");
            }
            let purged = limiter.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Expired attempt windows removed");
            }
        }
    });
}
