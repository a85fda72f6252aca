// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP boundary for the request governor.
//!
//! The `governor` middleware runs an admission check for every request and
//! turns refusals into JSON error responses. The admin routes expose the
//! secret-guarded unban and ban listing operations.

use crate::admin::{AdminControl, UnbanOutcome};
use crate::bans::BanRecord;
use crate::config::Config;
use crate::error::AdminError;
use crate::limiter::{now_millis, Decision, RateLimiter};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Header carrying the admin secret.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

const UNBAN_NOTE: &str = "Contact the owner to request unblocking.";

/// Shared application state.
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub admin: AdminControl,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, limiter: Arc<RateLimiter>) -> Self {
        Self {
            admin: AdminControl::new(&config.admin, Arc::clone(&limiter)),
            limiter,
            config,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banned_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            note: None,
            banned_at: None,
            reason: None,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Body of `POST /admin/unban`.
#[derive(Debug, Default, Deserialize)]
pub struct UnbanRequest {
    #[serde(default)]
    pub ip: Option<String>,
}

/// Query string accepted by admin routes.
#[derive(Debug, Default, Deserialize)]
pub struct AdminQuery {
    #[serde(rename = "adminKey", default)]
    pub admin_key: Option<String>,
}

/// Success body of `POST /admin/unban`.
#[derive(Debug, Serialize)]
pub struct UnbanResponse {
    pub success: bool,
    pub message: String,
}

/// Body of `GET /admin/bans`, keyed like the persisted ban table.
#[derive(Debug, Serialize)]
pub struct BanListResponse {
    pub success: bool,
    pub bans: BTreeMap<String, BanRecord>,
}

/// Build the router with the governor applied to every non-monitoring route.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/admin/unban", post(admin_unban))
        .route("/admin/bans", get(admin_bans));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), governor))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Identity of the requester: `X-Forwarded-For` verbatim when present,
/// else the peer IP.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

fn is_exempt(path: &str, config: &Config) -> bool {
    matches!(path, "/health" | "/healthz")
        || (config.metrics.enabled && path == config.metrics.path)
}

/// Admission middleware.
pub async fn governor(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if is_exempt(request.uri().path(), &state.config) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let identity = client_identity(request.headers(), peer);
    let context = format!("{} {}", request.method(), request.uri().path());

    match state
        .limiter
        .admit_with_context(&identity, now_millis(), &context)
    {
        Decision::Allow { count } => {
            debug!(identity = %identity, count, "Request allowed");
            next.run(request).await
        }
        Decision::Deny { reason, record } => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                note: Some(UNBAN_NOTE),
                banned_at: Some(record.banned_at),
                reason: Some(record.reason),
                ..ErrorResponse::new(format!(
                    "Your IP has been blocked due to abuse or rate limit violations ({reason})."
                ))
            }),
        )
            .into_response(),
        Decision::NewlyBanned { reason } => {
            warn!(identity = %identity, reason = %reason, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse {
                    note: Some(UNBAN_NOTE),
                    ..ErrorResponse::new("Rate limit exceeded - your IP has been blocked.")
                }),
            )
                .into_response()
        }
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "request-governor",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Fallback for unknown routes.
pub async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Endpoint not found")),
    )
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.limiter.metrics().render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Secret from the `X-Admin-Key` header, else the `adminKey` query parameter.
fn admin_secret<'a>(headers: &'a HeaderMap, query: &'a AdminQuery) -> Option<&'a str> {
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .or(query.admin_key.as_deref())
}

fn admin_rejection(err: AdminError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// Lift a ban: `POST /admin/unban` with `{"ip": "..."}`.
pub async fn admin_unban(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let secret = admin_secret(&headers, &query);
    if let Err(err) = state.admin.authorize(secret) {
        return admin_rejection(err);
    }

    let request: UnbanRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid JSON body")),
            )
                .into_response()
        }
    };

    let ip = request.ip.as_deref();
    match state.admin.unban(secret, ip) {
        Ok(UnbanOutcome::Unbanned) => (
            StatusCode::OK,
            Json(UnbanResponse {
                success: true,
                message: format!("IP {} unbanned.", ip.unwrap_or_default().trim()),
            }),
        )
            .into_response(),
        Ok(UnbanOutcome::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "IP {} not found in ban list.",
                ip.unwrap_or_default().trim()
            ))),
        )
            .into_response(),
        Err(err) => admin_rejection(err),
    }
}

/// List bans: `GET /admin/bans`.
pub async fn admin_bans(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
) -> Response {
    match state.admin.list_bans(admin_secret(&headers, &query)) {
        Ok(bans) => Json(BanListResponse {
            success: true,
            bans: bans
                .into_iter()
                .map(|record| (record.identity.clone(), record))
                .collect(),
        })
        .into_response(),
        Err(err) => admin_rejection(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_identity_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        assert_eq!(client_identity(&headers, Some(peer)), "192.0.2.1");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.9 "));
        assert_eq!(client_identity(&headers, Some(peer)), "203.0.113.9");
    }

    #[test]
    fn test_identity_without_peer() {
        assert_eq!(client_identity(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_admin_secret_sources() {
        let mut headers = HeaderMap::new();
        let query = AdminQuery {
            admin_key: Some("from-query".to_string()),
        };
        assert_eq!(admin_secret(&headers, &query), Some("from-query"));

        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(admin_secret(&headers, &query), Some("from-header"));
        assert_eq!(admin_secret(&headers, &AdminQuery::default()), Some("from-header"));
    }

    #[test]
    fn test_exempt_paths() {
        let config = Config::default();
        assert!(is_exempt("/health", &config));
        assert!(is_exempt("/metrics", &config));
        assert!(!is_exempt("/admin/unban", &config));
    }
}
