//! Cookie parsing and `Set-Cookie` construction for session tokens.

use std::fmt;

use axum::http::{HeaderMap, HeaderValue, header};
use tracing::warn;

use super::context::{API_ROOT, CookieNames};

/// Extract a cookie value from the Cookie header(s).
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

/// A session cookie with the fixed attribute policy: `HttpOnly`,
/// `SameSite=Strict`, scoped to the API root, `Secure` over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub value: String,
    pub secure: bool,
    /// `None` makes a browser-session cookie
    pub max_age: Option<u64>,
}

impl SessionCookie {
    pub fn new(name: &'static str, value: impl Into<String>, secure: bool) -> Self {
        Self {
            name,
            value: value.into(),
            secure,
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// An expired, empty cookie that makes the browser drop `name`.
    pub fn cleared(name: &'static str, secure: bool) -> Self {
        Self::new(name, "", secure).with_max_age(0)
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; HttpOnly; SameSite=Strict; Path={}",
            self.name, self.value, API_ROOT
        )?;
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age)?;
        }
        if self.secure {
            write!(f, "; Secure")?;
        }
        Ok(())
    }
}

/// Read and write cookies against a concrete HTTP layer.
pub trait CookieStore {
    fn cookie(&self, name: &str) -> Option<&str>;
    fn set_cookie(&mut self, cookie: &SessionCookie);
}

/// Reads from `Cookie`, appends to `Set-Cookie`.
impl CookieStore for HeaderMap {
    fn cookie(&self, name: &str) -> Option<&str> {
        get_cookie(self, name)
    }

    fn set_cookie(&mut self, cookie: &SessionCookie) {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                self.append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(cookie = cookie.name, error = %e, "Dropping unencodable cookie"),
        }
    }
}

/// Replace the session cookies in an inbound request's `Cookie` header so
/// later stages of the same request see the new tokens. Unrelated cookies
/// are preserved after the new pair.
pub fn rewrite_request_cookies(
    headers: &mut HeaderMap,
    names: CookieNames,
    access_token: &str,
    refresh_token: &str,
) {
    let mut pairs = vec![
        format!("{}={}", names.access, access_token),
        format!("{}={}", names.refresh, refresh_token),
    ];

    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let key = part.split_once('=').map_or(part, |(key, _)| key).trim();
            if key != names.access && key != names.refresh {
                pairs.push(part.to_string());
            }
        }
    }

    match HeaderValue::from_str(&pairs.join("; ")) {
        Ok(value) => {
            headers.insert(header::COOKIE, value);
        }
        Err(e) => warn!(error = %e, "Failed to rewrite request cookies"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("access=abc123"));

        assert_eq!(get_cookie(&headers, "access"), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; access=abc123; refresh=xyz789"),
        );

        assert_eq!(get_cookie(&headers, "access"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "refresh"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("foo=bar"));
        headers.append(header::COOKIE, HeaderValue::from_static("refresh=xyz789"));

        assert_eq!(get_cookie(&headers, "refresh"), Some("xyz789"));
    }

    #[test]
    fn test_get_cookie_prefixed_name_is_distinct() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("__Secure-access=secure; access=plain"),
        );

        assert_eq!(get_cookie(&headers, "access"), Some("plain"));
        assert_eq!(get_cookie(&headers, "__Secure-access"), Some("secure"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, "access"), None);
    }

    #[test]
    fn test_get_cookie_no_header() {
        let headers = HeaderMap::new();
        assert_eq!(get_cookie(&headers, "access"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  access = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, "access"), Some("abc123"));
    }

    #[test]
    fn test_session_cookie_format() {
        let cookie = SessionCookie::new("access", "tok", false).with_max_age(300);
        assert_eq!(
            cookie.to_string(),
            "access=tok; HttpOnly; SameSite=Strict; Path=/api; Max-Age=300"
        );

        let cookie = SessionCookie::new("__Secure-refresh", "tok", true);
        assert_eq!(
            cookie.to_string(),
            "__Secure-refresh=tok; HttpOnly; SameSite=Strict; Path=/api; Secure"
        );
    }

    #[test]
    fn test_cleared_cookie() {
        let cookie = SessionCookie::cleared("refresh", false);
        assert_eq!(
            cookie.to_string(),
            "refresh=; HttpOnly; SameSite=Strict; Path=/api; Max-Age=0"
        );
    }

    #[test]
    fn test_cookie_store_appends_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.set_cookie(&SessionCookie::new("access", "a", false));
        headers.set_cookie(&SessionCookie::new("refresh", "r", false));

        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_rewrite_replaces_session_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access=old; refresh=stale"),
        );

        rewrite_request_cookies(&mut headers, CookieNames::for_scheme(false), "new-a", "new-r");

        assert_eq!(
            headers.get(header::COOKIE).unwrap(),
            "access=new-a; refresh=new-r; theme=dark"
        );
        assert_eq!(headers.cookie("access"), Some("new-a"));
        assert_eq!(headers.cookie("theme"), Some("dark"));
    }

    #[test]
    fn test_rewrite_without_existing_cookies() {
        let mut headers = HeaderMap::new();

        rewrite_request_cookies(&mut headers, CookieNames::for_scheme(true), "a", "r");

        assert_eq!(
            headers.get(header::COOKIE).unwrap(),
            "__Secure-access=a; __Secure-refresh=r"
        );
    }
}
