use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

use crate::errors::{GatewayError, GatewayResult};

const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

// Fixed synthesis parameters; the gateway does not expose voice tuning.
const STABILITY: f32 = 0.5;
const SIMILARITY_BOOST: f32 = 0.5;

/// Synthesized audio, relayed to the caller exactly as the provider
/// produced it.
pub struct SpeechAudio {
    pub content_type: String,
    pub bytes: BoxStream<'static, Result<Bytes, reqwest::Error>>,
}

impl std::fmt::Debug for SpeechAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechAudio")
            .field("content_type", &self.content_type)
            .field("bytes", &"<stream>")
            .finish()
    }
}

/// Client for an ElevenLabs-style text-to-speech backend.
pub struct SpeechClient {
    client: reqwest::Client,
    host: String,
    api_key: String,
    voice_id: String,
}

impl SpeechClient {
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(SpeechClient {
            client,
            host: host.into(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
        })
    }

    /// Synthesize `text` and hand back the raw audio byte stream with the
    /// upstream content type preserved. A non-success upstream status maps
    /// to an `Upstream` error carrying that same status.
    pub async fn synthesize(&self, text: &str) -> GatewayResult<SpeechAudio> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream",
            self.host.trim_end_matches('/'),
            self.voice_id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "voice_settings": {
                    "stability": STABILITY,
                    "similarity_boost": SIMILARITY_BOOST,
                }
            }))
            .send()
            .await
            .map_err(GatewayError::upstream_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::upstream_status(
                status.as_u16(),
                "failed to generate speech",
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        Ok(SpeechAudio {
            content_type,
            bytes: response.bytes_stream().boxed(),
        })
    }
}
