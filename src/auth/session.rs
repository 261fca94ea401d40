//! Session issuing and request authentication.

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use serde::Serialize;
use tracing::{debug, error};

use super::cache::IdentityCache;
use super::context::RequestContext;
use super::cookie::{CookieStore, SessionCookie};
use super::errors::AuthError;
use crate::identity::{Identity, IdentityLookup, LookupError, single_match};
use crate::jwt::{SignedToken, SigningError, TokenCodec, TokenKind, unix_now};

/// The only security scheme name protected operations may declare.
pub const SECURITY_JWT: &str = "jwt";

/// Freshly minted token pair and the cookies that carry it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access_token: SignedToken,
    pub refresh_token: SignedToken,
    pub access_cookie: SessionCookie,
    pub refresh_cookie: SessionCookie,
}

impl IssuedSession {
    /// Append both `Set-Cookie` headers.
    pub fn write_cookies(&self, headers: &mut HeaderMap) {
        headers.set_cookie(&self.access_cookie);
        headers.set_cookie(&self.refresh_cookie);
    }
}

/// An identity resolved from a verified access token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedIdentity {
    #[serde(flatten)]
    pub identity: Identity,
    /// The raw token the caller presented
    pub token: String,
    /// Expiry of that token (Unix seconds)
    #[serde(skip)]
    pub expires_at: u64,
}

/// Orchestrates token codec, identity cache, and identity lookup.
#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<TokenCodec>,
    cache: Arc<IdentityCache>,
    identities: Arc<dyn IdentityLookup>,
}

impl SessionManager {
    pub fn new(
        codec: Arc<TokenCodec>,
        cache: Arc<IdentityCache>,
        identities: Arc<dyn IdentityLookup>,
    ) -> Self {
        Self {
            codec,
            cache,
            identities,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Mint a new access and refresh token for `identity`.
    pub fn issue(
        &self,
        ctx: &RequestContext,
        identity: &Identity,
        remember: bool,
    ) -> Result<IssuedSession, SigningError> {
        self.issue_at(ctx, identity, remember, unix_now().ok_or(SigningError::TimeError)?)
    }

    /// Like [`issue`](Self::issue), as if issued at `now` (Unix seconds).
    pub fn issue_at(
        &self,
        ctx: &RequestContext,
        identity: &Identity,
        remember: bool,
        now: u64,
    ) -> Result<IssuedSession, SigningError> {
        let remember_claim = remember.then_some(true);
        let access_token = self
            .codec
            .sign_at(&identity.uuid, TokenKind::Access, remember_claim, now)?;
        let refresh_token = self
            .codec
            .sign_at(&identity.uuid, TokenKind::Refresh, remember_claim, now)?;

        let names = ctx.cookie_names;
        let access_cookie = SessionCookie::new(names.access, &access_token.token, ctx.secure)
            .with_max_age(access_token.duration);
        let mut refresh_cookie =
            SessionCookie::new(names.refresh, &refresh_token.token, ctx.secure);
        if remember {
            refresh_cookie = refresh_cookie.with_max_age(refresh_token.duration);
        }

        Ok(IssuedSession {
            access_token,
            refresh_token,
            access_cookie,
            refresh_cookie,
        })
    }

    /// Authenticate a request for the operation's declared security scheme.
    ///
    /// The token comes from `Authorization: Bearer <token>` if that header is
    /// present, otherwise from the access cookie. A present but malformed
    /// `Authorization` header is rejected outright rather than falling back
    /// to the cookie.
    pub async fn authenticate(
        &self,
        security_name: &str,
        ctx: &RequestContext,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        if security_name != SECURITY_JWT {
            error!(security_name, "Unsupported security scheme");
            return Err(AuthError::Forbidden);
        }

        let token = match bearer_token(headers)? {
            Some(token) => token,
            None => headers
                .cookie(ctx.cookie_names.access)
                .filter(|token| !token.is_empty())
                .ok_or(AuthError::Unauthorized)?,
        };

        let claims = self
            .codec
            .verify(token, TokenKind::Access)
            .map_err(|e| {
                debug!(error = %e, "Access token rejected");
                AuthError::Unauthorized
            })?;

        let identity = self.resolve_identity(&claims.sub, claims.exp).await?;
        self.cache.put(&claims.sub, identity.clone(), claims.exp);

        Ok(AuthenticatedIdentity {
            identity,
            token: token.to_string(),
            expires_at: claims.exp,
        })
    }

    /// Cached identity if the token horizon has not regressed, otherwise a
    /// fresh lookup.
    async fn resolve_identity(&self, subject: &str, token_exp: u64) -> Result<Identity, AuthError> {
        if let Some(identity) = self.cache.get(subject, token_exp) {
            return Ok(identity);
        }

        match self.lookup_single(subject).await {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => {
                debug!(subject, "No unique identity for token subject");
                self.cache.invalidate(subject);
                Err(AuthError::Unauthorized)
            }
            Err(e) => {
                error!(subject, error = %e, "Identity lookup failed");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// The single identity for `subject`, or `None` on zero or several matches.
    pub(crate) async fn lookup_single(
        &self,
        subject: &str,
    ) -> Result<Option<Identity>, LookupError> {
        let records = self.identities.find_by_subject(subject).await?;
        Ok(single_match(records))
    }
}

/// Token from the `Authorization` header. `Ok(None)` when the header is
/// absent; `Forbidden` when it is present but not `Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::Forbidden)?;

    match value.split_once(' ') {
        Some(("Bearer", token)) if !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Err(AuthError::Forbidden),
    }
}
