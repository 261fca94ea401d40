//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::context::RequestContext;
use super::errors::AuthError;
use super::session::{AuthenticatedIdentity, SECURITY_JWT};
use super::state::HasSessionManager;

async fn authenticate_parts<S>(parts: &Parts, state: &S) -> Result<AuthenticatedIdentity, AuthError>
where
    S: HasSessionManager + Send + Sync,
{
    let ctx = RequestContext::resolve(&parts.extensions, &parts.headers);
    state
        .sessions()
        .authenticate(SECURITY_JWT, &ctx, &parts.headers)
        .await
}

/// Extractor for endpoints protected by the `jwt` security scheme.
/// Returns JSON 401/403 errors on failure.
pub struct Auth(pub AuthenticatedIdentity);

impl<S> FromRequestParts<S> for Auth
where
    S: HasSessionManager + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_parts(parts, state).await.map(Auth)
    }
}

/// Optional authentication extractor - never fails.
/// Useful for endpoints that work both authenticated and unauthenticated.
pub struct OptionalAuth(pub Option<AuthenticatedIdentity>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasSessionManager + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(authenticate_parts(parts, state).await.ok()))
    }
}
