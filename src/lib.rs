pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod identity;
pub mod jwt;

use api::create_api_router;
use auth::{API_ROOT, IdentityCache, SessionManager, enrich_request, refresh_session};
use axum::{Router, middleware};
use db::Database;
use jwt::{KeyRing, TokenCodec, TokenSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Keys for signing (current) and verifying (current + previous) tokens
    pub keys: KeyRing,
    /// Issuer, audience, and token lifetimes
    pub tokens: TokenSettings,
    /// Maximum number of cached identities (0 = unbounded)
    pub identity_cache_capacity: usize,
}

/// Build the session manager for a configuration, backed by its database.
pub fn create_session_manager(config: &ServerConfig) -> SessionManager {
    SessionManager::new(
        Arc::new(TokenCodec::new(config.keys.clone(), config.tokens.clone())),
        Arc::new(IdentityCache::with_capacity(config.identity_cache_capacity)),
        Arc::new(config.db.identities()),
    )
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    create_app_with_sessions(create_session_manager(config), config.db.clone())
}

/// Create the application router around an existing session manager.
///
/// Every API request is enriched with its [`auth::RequestContext`] first,
/// then offered a silent token refresh, before reaching a handler.
pub fn create_app_with_sessions(sessions: SessionManager, db: Database) -> Router {
    let api_router = create_api_router(sessions.clone(), db).layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(enrich_request))
            .layer(middleware::from_fn_with_state(sessions, refresh_session)),
    );

    Router::new().nest(API_ROOT, api_router)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task.
/// Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> std::io::Result<(tokio::task::JoinHandle<()>, SocketAddr)> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
