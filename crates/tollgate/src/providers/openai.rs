use base64::Engine;
use bytes::Bytes;
use futures::Stream;
use serde_json::{json, Value};
use std::time::Duration;

use crate::errors::{GatewayError, GatewayResult};
use crate::models::tool::ToolDefinition;
use crate::normalize::{tools_to_wire, WireMessage};
use crate::providers::registry::ProviderTarget;

/// Client for openai-compatible chat backends. One instance is shared
/// process-wide; the target (base URL, credential, capabilities) is chosen
/// per call by the registry.
pub struct ChatClient {
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new() -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Non-streaming chat completion; returns the parsed response body.
    pub async fn complete(
        &self,
        target: &ProviderTarget,
        model: &str,
        messages: &[WireMessage],
        tools: &[ToolDefinition],
        max_tokens: Option<i32>,
    ) -> GatewayResult<Value> {
        let payload = chat_payload(target, model, messages, tools, max_tokens, false);
        let response = self.post(target, "/v1/chat/completions", payload).await?;
        response
            .json()
            .await
            .map_err(GatewayError::upstream_transport)
    }

    /// Non-streaming completion reduced to the assistant's text.
    pub async fn complete_text(
        &self,
        target: &ProviderTarget,
        model: &str,
        messages: &[WireMessage],
        max_tokens: Option<i32>,
    ) -> GatewayResult<String> {
        let response = self.complete(target, model, messages, &[], max_tokens).await?;
        response
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| GatewayError::Upstream {
                status: None,
                message: "completion response carried no message content".to_string(),
            })
    }

    /// Streaming chat completion; returns the raw SSE byte stream for the
    /// relay to decode.
    pub async fn stream(
        &self,
        target: &ProviderTarget,
        model: &str,
        messages: &[WireMessage],
        tools: &[ToolDefinition],
        max_tokens: Option<i32>,
    ) -> GatewayResult<impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static> {
        let payload = chat_payload(target, model, messages, tools, max_tokens, true);
        let response = self.post(target, "/v1/chat/completions", payload).await?;
        Ok(response.bytes_stream())
    }

    /// Image synthesis through the legacy completions surface; returns the
    /// decoded image bytes.
    pub async fn generate_image(
        &self,
        target: &ProviderTarget,
        model: &str,
        prompt: &str,
    ) -> GatewayResult<Vec<u8>> {
        let payload = json!({
            "model": model,
            "prompt": prompt,
        });
        let response = self.post(target, "/v1/completions", payload).await?;
        let body: Value = response
            .json()
            .await
            .map_err(GatewayError::upstream_transport)?;

        let encoded = body
            .pointer("/choices/0/image_base64")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Upstream {
                status: None,
                message: "image response carried no image payload".to_string(),
            })?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| GatewayError::Upstream {
                status: None,
                message: format!("image payload was not valid base64: {e}"),
            })
    }

    async fn post(
        &self,
        target: &ProviderTarget,
        path: &str,
        payload: Value,
    ) -> GatewayResult<reqwest::Response> {
        let url = format!("{}{}", target.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&target.credential)
            .json(&payload)
            .send()
            .await
            .map_err(GatewayError::upstream_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::upstream_status(status.as_u16(), body));
        }
        Ok(response)
    }
}

fn chat_payload(
    target: &ProviderTarget,
    model: &str,
    messages: &[WireMessage],
    tools: &[ToolDefinition],
    max_tokens: Option<i32>,
    stream: bool,
) -> Value {
    let mut payload = json!({
        "model": model,
        "messages": messages,
    });

    // Tools are only advertised to targets that can act on them.
    if target.supports_tools && !tools.is_empty() {
        payload["tools"] = json!(tools_to_wire(tools));
        payload["tool_choice"] = json!("auto");
    }
    if let Some(max_tokens) = max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if stream {
        payload["stream"] = json!(true);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::{ConversationMessage, Role};
    use crate::normalize::{builtin_tools, normalize_messages};
    use crate::providers::registry::ModelMatcher;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target(base_url: String) -> ProviderTarget {
        ProviderTarget {
            id: "openai".to_string(),
            base_url,
            credential: "test_api_key".to_string(),
            matcher: ModelMatcher::Any,
            supports_vision: true,
            supports_tools: true,
        }
    }

    fn wire(messages: &[ConversationMessage], target: &ProviderTarget) -> Vec<WireMessage> {
        normalize_messages(messages, target, &[]).unwrap()
    }

    #[tokio::test]
    async fn test_complete_text_basic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello! How can I assist you today?"},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let target = target(server.uri());
        let client = ChatClient::new().unwrap();
        let messages = wire(&[ConversationMessage::user("Hello?")], &target);

        let text = client
            .complete_text(&target, "gpt-3.5-turbo", &messages, None)
            .await
            .unwrap();
        assert_eq!(text, "Hello! How can I assist you today?");
    }

    #[tokio::test]
    async fn test_upstream_status_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429).set_body_string("{\"error\":\"slow down\"}"),
            )
            .mount(&server)
            .await;

        let target = target(server.uri());
        let client = ChatClient::new().unwrap();
        let messages = wire(&[ConversationMessage::user("hi")], &target);

        let err = client
            .complete_text(&target, "gpt-4", &messages, None)
            .await
            .unwrap_err();
        match err {
            GatewayError::Upstream { status, message } => {
                assert_eq!(status, Some(429));
                assert!(message.contains("slow down"));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_requests_streaming_and_relays_bytes() {
        let server = MockServer::start().await;
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let target = target(server.uri());
        let client = ChatClient::new().unwrap();
        let messages = wire(&[ConversationMessage::user("hi")], &target);

        let stream = client
            .stream(&target, "gpt-4", &messages, &builtin_tools(), Some(500))
            .await
            .unwrap();
        let collected: Vec<Bytes> = stream.map(|b| b.unwrap()).collect().await;
        let body: Vec<u8> = collected.concat();
        assert_eq!(String::from_utf8(body).unwrap(), sse);
    }

    #[tokio::test]
    async fn test_generate_image_decodes_payload() {
        let server = MockServer::start().await;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"png-bytes");
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(body_partial_json(
                json!({"model": "stabilityai/stable-diffusion-xl-base-1.0", "prompt": "a fox"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"image_base64": encoded}]
            })))
            .mount(&server)
            .await;

        let target = target(server.uri());
        let client = ChatClient::new().unwrap();
        let bytes = client
            .generate_image(&target, "stabilityai/stable-diffusion-xl-base-1.0", "a fox")
            .await
            .unwrap();
        assert_eq!(bytes, b"png-bytes");
    }

    #[test]
    fn test_tools_omitted_for_non_tool_targets() {
        let mut bare = target("https://api.together.example".to_string());
        bare.supports_tools = false;

        let payload = chat_payload(
            &bare,
            "mistral-7b",
            &wire(&[ConversationMessage::new(Role::User, "hi")], &bare),
            &builtin_tools(),
            Some(500),
            false,
        );
        assert!(payload.get("tools").is_none());
        assert!(payload.get("tool_choice").is_none());
        assert_eq!(payload["max_tokens"], 500);
    }

    #[test]
    fn test_tools_advertised_with_auto_choice() {
        let capable = target("https://api.openai.example".to_string());
        let payload = chat_payload(
            &capable,
            "gpt-4",
            &wire(&[ConversationMessage::new(Role::User, "hi")], &capable),
            &builtin_tools(),
            Some(500),
            true,
        );
        assert_eq!(payload["tools"][0]["function"]["name"], "generate_image");
        assert_eq!(payload["tool_choice"], "auto");
        assert_eq!(payload["stream"], true);
    }
}
