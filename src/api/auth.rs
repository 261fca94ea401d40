//! Session endpoints.
//!
//! - GET `/me` - The authenticated identity and its token
//! - POST `/logout` - Clear both session cookies
//! - GET `/jwks` - Public keys for verifying issued tokens
//! - POST `/login` - Issue a session for an existing identity (test-mode only)

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use jsonwebtoken::jwk::JwkSet;
use serde::Serialize;

use crate::auth::{
    Auth, CookieStore, OptionalAuth, RequestContext, SessionCookie, SessionManager,
};
use crate::db::Database;
use crate::impl_has_session_manager;

#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionManager,
    #[cfg_attr(not(feature = "test-mode"), allow(dead_code))]
    pub db: Database,
}

impl_has_session_manager!(AuthState);

pub fn router(state: AuthState) -> Router {
    let router = Router::new()
        .route("/me", get(me))
        .route("/logout", post(logout))
        .route("/jwks", get(jwks));

    #[cfg(feature = "test-mode")]
    let router = router.route("/login", post(test_mode::login));

    router.with_state(state)
}

#[derive(Serialize)]
pub(crate) struct LoginResponse {
    uuid: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

async fn me(Auth(user): Auth) -> Json<LoginResponse> {
    Json(LoginResponse {
        uuid: user.identity.uuid,
        email: user.identity.email,
        token: Some(user.token),
    })
}

/// Current and previous public keys. Empty when signing with shared secrets.
async fn jwks(State(state): State<AuthState>) -> Json<JwkSet> {
    Json(state.sessions.codec().keys().jwks())
}

/// Clear both cookies and forget the caller's cached identity.
async fn logout(
    State(state): State<AuthState>,
    ctx: RequestContext,
    OptionalAuth(user): OptionalAuth,
) -> impl IntoResponse {
    if let Some(user) = user {
        state.sessions.cache().invalidate(&user.identity.uuid);
    }

    let mut headers = HeaderMap::new();
    headers.set_cookie(&SessionCookie::cleared(ctx.cookie_names.access, ctx.secure));
    headers.set_cookie(&SessionCookie::cleared(ctx.cookie_names.refresh, ctx.secure));

    (
        StatusCode::OK,
        headers,
        Json(serde_json::json!({ "success": true })),
    )
}

#[cfg(feature = "test-mode")]
mod test_mode {
    use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
    use serde::Deserialize;
    use tracing::error;

    use super::{AuthState, LoginResponse};
    use crate::api::error::{ApiError, ResultExt};
    use crate::auth::RequestContext;

    #[derive(Deserialize)]
    pub(super) struct LoginRequest {
        email: String,
        #[serde(default)]
        remember: bool,
    }

    /// Issue a session for an existing identity without credentials.
    pub(super) async fn login(
        State(state): State<AuthState>,
        ctx: RequestContext,
        Json(payload): Json<LoginRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let email = payload.email.trim();
        if email.is_empty() {
            return Err(ApiError::bad_request("Email cannot be empty"));
        }

        let identity = state
            .db
            .identities()
            .get_by_email(email)
            .await
            .db_err("Failed to get identity")?
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

        let issued = state
            .sessions
            .issue(&ctx, &identity, payload.remember)
            .map_err(|e| {
                error!("Failed to issue session: {}", e);
                ApiError::internal("Failed to generate token")
            })?;

        let mut headers = HeaderMap::new();
        issued.write_cookies(&mut headers);

        Ok((
            headers,
            Json(LoginResponse {
                uuid: identity.uuid,
                email: identity.email,
                token: Some(issued.access_token.token),
            }),
        ))
    }
}
