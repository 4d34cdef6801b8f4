//! Forwards a provider's incremental SSE output to the caller as an ordered
//! stream of [`StreamChunk`]s.
//!
//! The relay is a pull-driven generator: it reads upstream only when the
//! caller polls, so backpressure is inherited from the response body and a
//! caller disconnect drops the generator, which drops the upstream
//! connection. Nothing keeps draining an abandoned stream.

use async_stream::stream;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::errors::{GatewayError, GatewayResult};
use crate::models::chunk::{FinishReason, StreamChunk, ToolCallDelta};
use crate::models::tool::ToolCallRequest;

/// Out-of-band observers for one relayed exchange.
///
/// `on_tool_call` fires at most once, with the first tool call the provider
/// completed mid-stream. Its result is never injected into the committed
/// response; the caller re-enters the conversation with a follow-up turn.
/// `on_final` fires exactly once when the stream ends, with the full
/// concatenation of all delta text, for server-side audit only.
pub struct RelayHooks {
    pub on_tool_call: Option<Box<dyn FnOnce(ToolCallRequest) + Send>>,
    pub on_final: Option<Box<dyn FnOnce(String) + Send>>,
}

impl RelayHooks {
    pub fn none() -> Self {
        RelayHooks {
            on_tool_call: None,
            on_final: None,
        }
    }
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Relay an upstream SSE byte stream as ordered chunks.
///
/// Events are decoded strictly in arrival order and forwarded without
/// reordering or batching. The stream is tied to one upstream connection and
/// terminates on the `[DONE]` sentinel, connection close, or an upstream
/// error; the error case surfaces a terminal `Err` item rather than a
/// silent truncation.
pub fn relay<S, E>(
    upstream: S,
    mut hooks: RelayHooks,
) -> impl Stream<Item = GatewayResult<StreamChunk>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    stream! {
        let mut events = Box::pin(upstream.eventsource());
        let mut transcript = String::new();
        let mut pending: Vec<PartialToolCall> = Vec::new();

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    if let Some(finalize) = hooks.on_final.take() {
                        finalize(std::mem::take(&mut transcript));
                    }
                    yield Err(GatewayError::upstream_transport(err));
                    break;
                }
            };

            if event.data.trim() == "[DONE]" {
                break;
            }

            let frame: Value = match serde_json::from_str(&event.data) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::debug!("skipping undecodable stream frame: {err}");
                    continue;
                }
            };
            let choice = match frame.get("choices").and_then(|c| c.get(0)) {
                Some(choice) => choice,
                None => continue,
            };

            if let Some(delta) = choice.get("delta") {
                if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
                    if !text.is_empty() {
                        transcript.push_str(text);
                        yield Ok(StreamChunk::text(text));
                    }
                }

                if let Some(calls) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                    for call in calls {
                        let fragment = decode_tool_fragment(call);
                        accumulate(&mut pending, &fragment);
                        yield Ok(StreamChunk::tool_call(fragment));
                    }
                }
            }

            if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
                let reason = FinishReason::parse(reason);
                if reason == FinishReason::ToolCalls {
                    if let (Some(request), Some(dispatch)) =
                        (assemble(&pending), hooks.on_tool_call.take())
                    {
                        dispatch(request);
                    }
                }
                yield Ok(StreamChunk::finish(reason));
            }
        }

        if let Some(finalize) = hooks.on_final.take() {
            finalize(std::mem::take(&mut transcript));
        }
    }
}

fn decode_tool_fragment(call: &Value) -> ToolCallDelta {
    ToolCallDelta {
        index: call.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
        id: call.get("id").and_then(|v| v.as_str()).map(String::from),
        name: call
            .pointer("/function/name")
            .and_then(|v| v.as_str())
            .map(String::from),
        arguments: call
            .pointer("/function/arguments")
            .and_then(|v| v.as_str())
            .map(String::from),
    }
}

/// Fold one fragment into the per-index accumulators. `id` and `name`
/// arrive once; `arguments` arrive in pieces and concatenate.
fn accumulate(pending: &mut Vec<PartialToolCall>, fragment: &ToolCallDelta) {
    if pending.len() <= fragment.index {
        pending.resize_with(fragment.index + 1, PartialToolCall::default);
    }
    let entry = &mut pending[fragment.index];
    if let Some(id) = &fragment.id {
        if entry.id.is_empty() {
            entry.id = id.clone();
        }
    }
    if let Some(name) = &fragment.name {
        if entry.name.is_empty() {
            entry.name = name.clone();
        }
    }
    if let Some(arguments) = &fragment.arguments {
        entry.arguments.push_str(arguments);
    }
}

fn assemble(pending: &[PartialToolCall]) -> Option<ToolCallRequest> {
    pending
        .iter()
        .find(|call| !call.name.is_empty())
        .map(|call| ToolCallRequest {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn frame(json: &str) -> Result<Bytes, Infallible> {
        Ok(Bytes::from(format!("data: {json}\n\n")))
    }

    fn text_frame(text: &str) -> Result<Bytes, Infallible> {
        frame(&serde_json::json!({"choices": [{"delta": {"content": text}}]}).to_string())
    }

    async fn collect<S, E>(upstream: S, hooks: RelayHooks) -> Vec<GatewayResult<StreamChunk>>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        relay(upstream, hooks).collect().await
    }

    #[tokio::test]
    async fn test_delta_text_is_lossless_and_ordered() {
        let upstream = futures::stream::iter(vec![
            text_frame("Hel"),
            text_frame("lo "),
            text_frame("world"),
            frame(r#"{"choices": [{"delta": {}, "finish_reason": "stop"}]}"#),
            Ok(Bytes::from("data: [DONE]\n\n")),
        ]);

        let chunks = collect(upstream, RelayHooks::none()).await;
        let texts: Vec<String> = chunks
            .iter()
            .filter_map(|c| c.as_ref().ok()?.delta_text.clone())
            .collect();

        assert_eq!(texts, vec!["Hel", "lo ", "world"]);
        assert_eq!(texts.concat(), "Hello world");
        assert_eq!(
            chunks.last().unwrap().as_ref().unwrap().finish_reason,
            Some(FinishReason::Stop)
        );
    }

    #[tokio::test]
    async fn test_events_split_across_byte_boundaries() {
        // One SSE event arriving in two transport reads must still decode
        // as a single frame.
        let payload = format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": "split"}}]})
        );
        let (head, tail) = payload.split_at(10);
        let upstream = futures::stream::iter(vec![
            Ok::<_, Infallible>(Bytes::from(head.to_string())),
            Ok(Bytes::from(tail.to_string())),
        ]);

        let chunks = collect(upstream, RelayHooks::none()).await;
        assert_eq!(
            chunks[0].as_ref().unwrap().delta_text.as_deref(),
            Some("split")
        );
    }

    #[tokio::test]
    async fn test_finalize_fires_once_with_full_transcript() {
        let seen = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));
        let hooks = RelayHooks {
            on_tool_call: None,
            on_final: Some(Box::new({
                let seen = seen.clone();
                let calls = calls.clone();
                move |full| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    *seen.lock().unwrap() = Some(full);
                }
            })),
        };

        let upstream = futures::stream::iter(vec![
            text_frame("a"),
            text_frame("b"),
            Ok(Bytes::from("data: [DONE]\n\n")),
        ]);
        collect(upstream, hooks).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn test_fragmented_tool_call_is_reassembled() {
        let captured = Arc::new(Mutex::new(None));
        let hooks = RelayHooks {
            on_tool_call: Some(Box::new({
                let captured = captured.clone();
                move |request| *captured.lock().unwrap() = Some(request)
            })),
            on_final: None,
        };

        let upstream = futures::stream::iter(vec![
            frame(
                r#"{"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "generate_image", "arguments": ""}}]}}]}"#,
            ),
            frame(
                r#"{"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"descri"}}]}}]}"#,
            ),
            frame(
                r#"{"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "ption\":\"a fox\"}"}}]}}]}"#,
            ),
            frame(r#"{"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}"#),
            Ok(Bytes::from("data: [DONE]\n\n")),
        ]);

        let chunks = collect(upstream, hooks).await;

        let request = captured.lock().unwrap().take().expect("tool call dispatched");
        assert_eq!(request.id, "call_1");
        assert_eq!(request.name, "generate_image");
        let arguments: Value = serde_json::from_str(&request.arguments).unwrap();
        assert_eq!(arguments["description"], "a fox");

        assert_eq!(
            chunks.last().unwrap().as_ref().unwrap().finish_reason,
            Some(FinishReason::ToolCalls)
        );
    }

    #[tokio::test]
    async fn test_upstream_error_surfaces_terminal_err() {
        let seen = Arc::new(Mutex::new(None));
        let hooks = RelayHooks {
            on_tool_call: None,
            on_final: Some(Box::new({
                let seen = seen.clone();
                move |full| *seen.lock().unwrap() = Some(full)
            })),
        };

        let upstream = futures::stream::iter(vec![
            Ok(Bytes::from(format!(
                "data: {}\n\n",
                serde_json::json!({"choices": [{"delta": {"content": "partial"}}]})
            ))),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            )),
        ]);

        let chunks = collect(upstream, hooks).await;

        assert_eq!(
            chunks[0].as_ref().unwrap().delta_text.as_deref(),
            Some("partial")
        );
        match chunks.last().unwrap() {
            Err(GatewayError::Upstream { status: None, .. }) => {}
            other => panic!("expected terminal upstream error, got {other:?}"),
        }
        // The audit hook still sees what was delivered before the fault.
        assert_eq!(seen.lock().unwrap().as_deref(), Some("partial"));
    }

    #[tokio::test]
    async fn test_keepalive_frames_are_skipped() {
        let upstream = futures::stream::iter(vec![
            Ok::<_, Infallible>(Bytes::from("data: \n\n")),
            text_frame("ok"),
            Ok(Bytes::from("data: [DONE]\n\n")),
        ]);

        let chunks = collect(upstream, RelayHooks::none()).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().delta_text.as_deref(), Some("ok"));
    }
}
