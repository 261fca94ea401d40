//! Per-request derived values: scheme, host, URLs, and cookie names.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request},
    http::{Extensions, HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use url::Url;

/// Path prefix of every API route. Session cookies are scoped to it.
pub const API_ROOT: &str = "/api";

const DEFAULT_HOST: &str = "localhost:3000";

/// Access cookie name over plain HTTP.
pub const ACCESS_COOKIE_NAME: &str = "access";
/// Refresh cookie name over plain HTTP.
pub const REFRESH_COOKIE_NAME: &str = "refresh";
/// Access cookie name over HTTPS.
pub const SECURE_ACCESS_COOKIE_NAME: &str = "__Secure-access";
/// Refresh cookie name over HTTPS.
pub const SECURE_REFRESH_COOKIE_NAME: &str = "__Secure-refresh";

/// The access/refresh cookie name pair for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieNames {
    pub access: &'static str,
    pub refresh: &'static str,
}

impl CookieNames {
    pub fn for_scheme(secure: bool) -> Self {
        if secure {
            Self {
                access: SECURE_ACCESS_COOKIE_NAME,
                refresh: SECURE_REFRESH_COOKIE_NAME,
            }
        } else {
            Self {
                access: ACCESS_COOKIE_NAME,
                refresh: REFRESH_COOKIE_NAME,
            }
        }
    }
}

/// Immutable values derived once per inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// `http` or `https`
    pub scheme: &'static str,
    /// Whether the request arrived over HTTPS (possibly via a proxy)
    pub secure: bool,
    pub host: String,
    pub base_url: String,
    pub api_url: String,
    pub auth_url: String,
    pub openapi_url: String,
    pub openapi_docs_url: String,
    pub cookie_names: CookieNames,
}

impl RequestContext {
    /// Derive the context from forwarded headers, falling back to the
    /// `Host` header and finally to a local default.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let secure = header_value(headers, "x-forwarded-proto")
            .or_else(|| header_value(headers, "x-scheme"))
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https"));
        let scheme = if secure { "https" } else { "http" };

        let requested_host = header_value(headers, "x-forwarded-host")
            .or_else(|| header_value(headers, header::HOST.as_str()))
            .unwrap_or(DEFAULT_HOST);

        let (host, base_url) = match origin(scheme, requested_host) {
            Some(origin) => origin,
            None => {
                debug!(host = %requested_host, "Unusable host header, using default");
                origin(scheme, DEFAULT_HOST).unwrap_or_else(|| {
                    (
                        DEFAULT_HOST.to_string(),
                        format!("{scheme}://{DEFAULT_HOST}"),
                    )
                })
            }
        };

        let api_url = format!("{}{}", base_url, API_ROOT);
        Self {
            scheme,
            secure,
            host,
            auth_url: format!("{}/auth", api_url),
            openapi_url: format!("{}/openapi.json", api_url),
            openapi_docs_url: format!("{}/swagger.html", api_url),
            api_url,
            base_url,
            cookie_names: CookieNames::for_scheme(secure),
        }
    }

    /// The context stored by [`enrich_request`], or one derived on the spot.
    pub fn resolve(extensions: &Extensions, headers: &HeaderMap) -> Self {
        extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| Self::from_headers(headers))
    }
}

/// First comma-separated value of a header, trimmed.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let value = headers.get(name)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    if first.is_empty() { None } else { Some(first) }
}

/// Normalized `(host, origin)` for a scheme and host, if the host parses.
fn origin(scheme: &str, host: &str) -> Option<(String, String)> {
    let url = Url::parse(&format!("{scheme}://{host}")).ok()?;
    if url.path() != "/" || url.query().is_some() || !url.username().is_empty() {
        return None;
    }
    let host_str = url.host_str()?;
    let host = match url.port() {
        Some(port) => format!("{host_str}:{port}"),
        None => host_str.to_string(),
    };
    Some((host, url.origin().ascii_serialization()))
}

/// Middleware that attaches a [`RequestContext`] to every request.
pub async fn enrich_request(mut request: Request, next: Next) -> Response {
    let context = RequestContext::from_headers(request.headers());
    request.extensions_mut().insert(context);
    next.run(request).await
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::resolve(&parts.extensions, &parts.headers))
    }
}
