use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tollgate::errors::GatewayError;
use tollgate::jobs;

use super::{caller_identity, rate_limited_response};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct VoiceRequest {
    text: String,
}

async fn handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<VoiceRequest>,
) -> Result<Response, ApiError> {
    let identity = caller_identity(connect_info.map(|info| info.0), &headers);
    let decision = state.limiter.check(&identity).await;
    if !decision.allowed {
        return Ok(rate_limited_response(&decision));
    }

    let audio = jobs::synthesize_voice(&state.speech, &request.text).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, audio.content_type)
        .body(Body::from_stream(audio.bytes))
        .map_err(|e| ApiError(GatewayError::Internal(e.to_string())))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new().route("/voice", post(handler)).with_state(state)
}
