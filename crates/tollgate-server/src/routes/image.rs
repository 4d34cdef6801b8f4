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
struct ImageRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct ImageResponse {
    image: String,
}

async fn handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<ImageRequest>,
) -> Result<Response, ApiError> {
    let identity = caller_identity(connect_info.map(|info| info.0), &headers);
    let decision = state.limiter.check(&identity).await;
    if !decision.allowed {
        return Ok(rate_limited_response(&decision));
    }

    let image = jobs::generate_image(
        &state.chat,
        &state.registry,
        state.storage.as_ref(),
        &request.prompt,
    )
    .await?;
    Ok(Json(ImageResponse { image }).into_response())
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/generate-image", post(handler))
        .with_state(state)
}
