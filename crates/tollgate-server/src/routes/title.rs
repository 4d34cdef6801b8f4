use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tollgate::jobs;

use super::{caller_identity, rate_limited_response};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TitleRequest {
    #[serde(rename = "initialMessage")]
    initial_message: String,
}

#[derive(Debug, Serialize)]
struct TitleResponse {
    title: String,
}

async fn handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<TitleRequest>,
) -> Result<Response, ApiError> {
    let identity = caller_identity(connect_info.map(|info| info.0), &headers);
    let decision = state.limiter.check(&identity).await;
    if !decision.allowed {
        return Ok(rate_limited_response(&decision));
    }

    let title =
        jobs::generate_title(&state.chat, &state.registry, &request.initial_message).await?;
    Ok(Json(TitleResponse { title }).into_response())
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/generate-title", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tollgate::limiter::{MemoryCounterStore, RateLimiter};
    use tollgate::normalize::builtin_tools;
    use tollgate::providers::elevenlabs::SpeechClient;
    use tollgate::providers::openai::ChatClient;
    use tollgate::providers::registry::{ModelMatcher, ProviderRegistry, ProviderTarget};
    use tollgate::storage::SupabaseStore;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_state(provider_host: String, limit: u32) -> AppState {
        AppState {
            registry: Arc::new(ProviderRegistry::new(vec![ProviderTarget {
                id: "openai".to_string(),
                base_url: provider_host,
                credential: "sk-test".to_string(),
                matcher: ModelMatcher::Any,
                supports_vision: true,
                supports_tools: true,
            }])),
            limiter: Arc::new(RateLimiter::new(
                Box::new(MemoryCounterStore::new()),
                limit,
                Duration::from_secs(3600),
            )),
            chat: Arc::new(ChatClient::new().unwrap()),
            speech: Arc::new(
                SpeechClient::new("http://unused.invalid", "xi-test", "voice").unwrap(),
            ),
            storage: Arc::new(
                SupabaseStore::new("http://unused.invalid", "key", "uploads").unwrap(),
            ),
            tools: Arc::new(builtin_tools()),
            default_model: "gpt-3.5-turbo".to_string(),
            max_tokens: Some(500),
        }
    }

    fn title_request(agent: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate-title")
            .header("content-type", "application/json")
            .header("user-agent", agent)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_title_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Debugging null pointer crash\n"}
                }]
            })))
            .mount(&server)
            .await;

        let app = routes(test_state(server.uri(), 30));
        let response = app
            .oneshot(title_request(
                "title-test",
                json!({"initialMessage": "I need help debugging a null pointer crash in my server"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let title = body["title"].as_str().unwrap();
        assert_eq!(title, "Debugging null pointer crash");
        assert!(!title.contains('\n'));
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let app = routes(test_state("http://unused.invalid".to_string(), 30));
        let response = app
            .oneshot(title_request("title-test", json!({"initialMessage": "  "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limited_before_upstream_work() {
        // No provider mock is mounted: a rejected call must not reach one.
        let app = routes(test_state("http://unused.invalid".to_string(), 1));

        let ok = app
            .clone()
            .oneshot(title_request("quota-test", json!({"initialMessage": "hi"})))
            .await
            .unwrap();
        // First call passes the limiter and then fails on the dead upstream.
        assert_ne!(ok.status(), StatusCode::TOO_MANY_REQUESTS);

        let limited = app
            .oneshot(title_request("quota-test", json!({"initialMessage": "hi"})))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()["X-RateLimit-Remaining"], "0");
    }
}
