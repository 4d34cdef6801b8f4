use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tollgate::errors::GatewayError;
use tollgate::models::message::ConversationMessage;
use tollgate::normalize::normalize_messages;
use tollgate::relay::{relay, RelayHooks};

use super::{caller_identity, rate_limited_response};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<ConversationMessage>,
    #[serde(default, rename = "selectedModelName")]
    selected_model_name: Option<String>,
}

async fn handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let identity = caller_identity(connect_info.map(|info| info.0), &headers);
    let decision = state.limiter.check(&identity).await;
    if !decision.allowed {
        return Ok(rate_limited_response(&decision));
    }

    let model = request
        .selected_model_name
        .unwrap_or_else(|| state.default_model.clone());
    let target = state.registry.select(&model)?;
    let messages = normalize_messages(&request.messages, target, state.tools.as_slice())?;

    let upstream = state
        .chat
        .stream(
            target,
            &model,
            &messages,
            state.tools.as_slice(),
            state.max_tokens,
        )
        .await?;

    let hooks = RelayHooks {
        // The dispatch result is not injected into this response; the
        // client issues a follow-up request once it sees the call.
        on_tool_call: Some(Box::new(|call| {
            tracing::info!(name = %call.name, arguments = %call.arguments, "tool call requested mid-stream");
        })),
        on_final: Some(Box::new(|completion| {
            tracing::info!(%completion, "chat stream finished");
        })),
    };

    let chunks = relay(upstream, hooks);
    let body = Body::from_stream(chunks.filter_map(|item| async move {
        match item {
            Ok(chunk) => chunk.delta_text.map(|text| Ok(Bytes::from(text))),
            Err(err) => Some(Err(err)),
        }
    }));

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .map_err(|e| ApiError(GatewayError::Internal(e.to_string())))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new().route("/chat", post(handler)).with_state(state)
}
