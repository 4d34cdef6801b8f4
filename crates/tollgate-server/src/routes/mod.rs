// Export route modules
pub mod chat;
pub mod image;
pub mod title;
pub mod voice;

use std::net::SocketAddr;

use axum::http::{header::USER_AGENT, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tollgate::limiter::RateDecision;

use crate::state::AppState;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(chat::routes(state.clone()))
        .merge(title::routes(state.clone()))
        .merge(image::routes(state.clone()))
        .merge(voice::routes(state))
}

/// The opaque identifier rate limits are keyed by: peer address, else the
/// caller's user agent, else a fixed literal. Callers are never
/// unidentified.
pub(crate) fn caller_identity(addr: Option<SocketAddr>, headers: &HeaderMap) -> String {
    if let Some(addr) = addr {
        return addr.ip().to_string();
    }
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "api".to_string())
}

/// The shared 429 shape: JSON message plus quota headers.
pub(crate) fn rate_limited_response(decision: &RateDecision) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("X-RateLimit-Limit", decision.limit.to_string()),
            ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ],
        Json(json!({ "message": "The request has been rate limited." })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_peer_address() {
        let addr: SocketAddr = "203.0.113.7:55000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, "curl/8.0".parse().unwrap());

        assert_eq!(caller_identity(Some(addr), &headers), "203.0.113.7");
    }

    #[test]
    fn test_identity_falls_back_to_user_agent_then_literal() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, "curl/8.0".parse().unwrap());
        assert_eq!(caller_identity(None, &headers), "curl/8.0");

        assert_eq!(caller_identity(None, &HeaderMap::new()), "api");
    }

    #[test]
    fn test_rate_limited_response_shape() {
        let decision = RateDecision {
            allowed: false,
            limit: 30,
            remaining: 0,
            reset_at: 0,
        };
        let response = rate_limited_response(&decision);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["X-RateLimit-Limit"], "30");
        assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");
    }
}
