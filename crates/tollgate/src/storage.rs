use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::errors::{GatewayError, GatewayResult};

/// Object storage collaborator: upload bytes under a caller-chosen key and
/// resolve the public URL for a stored path.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, name: &str, bytes: Vec<u8>, content_type: &str)
        -> GatewayResult<String>;

    fn public_url(&self, path: &str) -> String;
}

/// Supabase-style storage REST backend.
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStore {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(SupabaseStore {
            client,
            base_url: base_url.into(),
            service_key: service_key.into(),
            bucket: bucket.into(),
        })
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> GatewayResult<String> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            name
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(GatewayError::upstream_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::upstream_status(status.as_u16(), body));
        }

        // The API reports the stored path as `Key`; fall back to the path
        // we asked for if the body is missing it.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(body
            .get("Key")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| format!("{}/{}", self.bucket, name)))
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}",
            self.base_url.trim_end_matches('/'),
            path
        )
    }
}
