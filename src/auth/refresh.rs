//! Silent access-token refresh.
//!
//! Runs before authentication. When the access cookie no longer verifies but
//! the refresh cookie does, a new token pair is minted, the inbound `Cookie`
//! header is rewritten so authentication later in the same request sees the
//! new access token, and both cookies are set on the response. Every other
//! case passes the request through untouched.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, info, warn};

use super::context::RequestContext;
use super::cookie::{CookieStore, rewrite_request_cookies};
use super::session::{IssuedSession, SessionManager};
use crate::jwt::TokenKind;

/// What the refresh step decided for one request.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// No refresh cookie was sent
    NoRefreshCookie,
    /// The access cookie still verifies
    AccessValid,
    /// The refresh cookie failed verification
    RefreshRejected,
    /// The refresh subject did not resolve to exactly one identity, or the
    /// identity store was unavailable
    IdentityUnresolved,
    /// A new token pair was minted
    Refreshed(Box<IssuedSession>),
}

impl SessionManager {
    /// Decide whether this request warrants new tokens, minting them if so.
    /// Never fails: anything short of a successful refresh is a pass-through.
    pub async fn refresh(&self, ctx: &RequestContext, headers: &HeaderMap) -> RefreshOutcome {
        let names = ctx.cookie_names;

        let Some(refresh_token) = headers.cookie(names.refresh) else {
            return RefreshOutcome::NoRefreshCookie;
        };

        if let Some(access_token) = headers.cookie(names.access) {
            if self.codec().verify(access_token, TokenKind::Access).is_ok() {
                return RefreshOutcome::AccessValid;
            }
        }

        let claims = match self.codec().verify(refresh_token, TokenKind::Refresh) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Refresh token rejected");
                return RefreshOutcome::RefreshRejected;
            }
        };

        let identity = match self.lookup_single(&claims.sub).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!(subject = %claims.sub, "No unique identity for refresh subject");
                return RefreshOutcome::IdentityUnresolved;
            }
            Err(e) => {
                warn!(
                    subject = %claims.sub,
                    error = %e,
                    "Skipping refresh, identity store unavailable"
                );
                return RefreshOutcome::IdentityUnresolved;
            }
        };

        match self.issue(ctx, &identity, true) {
            Ok(issued) => {
                info!(subject = %claims.sub, "Session refreshed");
                RefreshOutcome::Refreshed(Box::new(issued))
            }
            Err(e) => {
                warn!(subject = %claims.sub, error = %e, "Failed to mint refreshed tokens");
                RefreshOutcome::IdentityUnresolved
            }
        }
    }
}

/// Middleware applying [`SessionManager::refresh`] to every request.
pub async fn refresh_session(
    State(sessions): State<SessionManager>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let ctx = RequestContext::resolve(&parts.extensions, &parts.headers);

    let RefreshOutcome::Refreshed(issued) = sessions.refresh(&ctx, &parts.headers).await else {
        return next.run(Request::from_parts(parts, body)).await;
    };

    rewrite_request_cookies(
        &mut parts.headers,
        ctx.cookie_names,
        &issued.access_token.token,
        &issued.refresh_token.token,
    );

    let mut response = next.run(Request::from_parts(parts, body)).await;
    issued.write_cookies(response.headers_mut());
    response
}
