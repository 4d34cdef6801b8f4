use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tollgate::errors::GatewayError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a configuration field path like `providers.openai_api_key` to the
/// environment variable that would have set it.
pub fn to_env_var(field: &str) -> String {
    format!("TOLLGATE_{}", field.replace('.', "__").to_uppercase())
}

/// Gateway error in HTTP clothing.
///
/// Caller-fixable conditions surface as 400s, upstream failures pass the
/// upstream status through (502 when there is none), and internal faults
/// collapse to a generic 500 with the detail kept server-side.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            GatewayError::NoProviderMatch(_)
            | GatewayError::UnsupportedModality(_)
            | GatewayError::MalformedRequest(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            GatewayError::Upstream { status, message } => {
                let status = status
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                (status, message.clone())
            }
            GatewayError::Internal(detail) => {
                tracing::error!("internal failure: {detail}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
