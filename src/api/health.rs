//! Health endpoint.

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::auth::RequestContext;
use crate::jwt::unix_now;

/// Package name embedded at compile time from Cargo.toml
const NAME: &str = env!("CARGO_PKG_NAME");

/// Version embedded at compile time from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Hrefs {
    api: String,
    open_api: String,
    open_api_docs: String,
}

#[derive(Serialize)]
struct HealthResponse {
    name: &'static str,
    version: &'static str,
    /// Unix seconds
    now: u64,
    hrefs: Hrefs,
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/", get(health))
}

async fn health(ctx: RequestContext) -> Json<HealthResponse> {
    Json(HealthResponse {
        name: NAME,
        version: VERSION,
        now: unix_now().unwrap_or_default(),
        hrefs: Hrefs {
            api: ctx.api_url,
            open_api: ctx.openapi_url,
            open_api_docs: ctx.openapi_docs_url,
        },
    })
}
