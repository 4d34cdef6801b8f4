use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no provider matches model '{0}'")]
    NoProviderMatch(String),

    #[error("unsupported modality: {0}")]
    UnsupportedModality(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("upstream request failed: {message}")]
    Upstream {
        /// HTTP status returned by the upstream, when one was received.
        status: Option<u16>,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Upstream failure for which no HTTP status exists (transport faults).
    pub fn upstream_transport(err: impl std::fmt::Display) -> Self {
        GatewayError::Upstream {
            status: None,
            message: err.to_string(),
        }
    }

    pub fn upstream_status(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
