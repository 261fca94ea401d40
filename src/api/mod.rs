mod auth;
pub mod error;
mod health;

use axum::Router;

use crate::auth::SessionManager;
use crate::db::Database;

/// Create the API router. Mounted under [`crate::auth::API_ROOT`].
pub fn create_api_router(sessions: SessionManager, db: Database) -> Router {
    let auth_state = auth::AuthState { sessions, db };

    Router::new()
        .nest("/health", health::router())
        .nest("/auth", auth::router(auth_state))
}
