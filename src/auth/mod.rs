//! JWT session authentication.
//!
//! Dual-token system: short-lived access tokens authorize requests and
//! long-lived refresh tokens let the refresh middleware mint a new pair
//! silently. Identity lookups behind verified tokens are cached per subject.

mod cache;
mod context;
mod cookie;
mod errors;
mod extractors;
mod refresh;
mod session;
mod state;

pub use cache::{DEFAULT_CACHE_CAPACITY, IdentityCache};
pub use context::{
    ACCESS_COOKIE_NAME, API_ROOT, CookieNames, REFRESH_COOKIE_NAME, RequestContext,
    SECURE_ACCESS_COOKIE_NAME, SECURE_REFRESH_COOKIE_NAME, enrich_request,
};
pub use cookie::{CookieStore, SessionCookie, get_cookie, rewrite_request_cookies};
pub use errors::AuthError;
pub use extractors::{Auth, OptionalAuth};
pub use refresh::{RefreshOutcome, refresh_session};
pub use session::{AuthenticatedIdentity, IssuedSession, SECURITY_JWT, SessionManager};
pub use state::HasSessionManager;
