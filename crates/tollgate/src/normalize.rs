//! Converts an inbound conversation into the wire shape a chosen provider
//! expects: one fixed system message up front, image attachments expanded
//! into multimodal part arrays, tool fields carried through verbatim.

use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{GatewayError, GatewayResult};
use crate::models::message::{ConversationMessage, Role};
use crate::models::tool::{ToolCall, ToolDefinition};
use crate::providers::registry::ProviderTarget;

const GROUND_RULES: &str = "You are a helpful assistant. Respond directly and concisely, staying grounded in the conversation.";

const TOOL_POLICY: &str = "You have access to a generate_image function. This should only be used when a user specifically requests an image to be generated. If you are not sure if the user wants an image, you should NOT mention anything about your ability to generate an image, or ask them if they would want an image or text response, in these cases, you should only respond with text.";

/// Message content on the wire: a plain string, or an ordered sequence of
/// text and image parts. The tagged split keeps the normalizer's branching
/// exhaustive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageRef },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub url: String,
}

/// One message in the provider request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: WireContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        WireMessage {
            role,
            content: WireContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// The fixed system message for a chat exchange: behavioral ground rules,
/// plus the tool invocation policy when the target can actually see tools.
pub fn system_prompt(target: &ProviderTarget, tools: &[ToolDefinition]) -> String {
    if target.supports_tools && !tools.is_empty() {
        format!("{GROUND_RULES}\n\n{TOOL_POLICY}")
    } else {
        GROUND_RULES.to_string()
    }
}

/// Build the provider-facing message array for one conversation.
///
/// Fails with `UnsupportedModality` when a message carries an image and the
/// target cannot accept one; silently mis-serializing the part would be
/// worse than rejecting the request.
pub fn normalize_messages(
    messages: &[ConversationMessage],
    target: &ProviderTarget,
    tools: &[ToolDefinition],
) -> GatewayResult<Vec<WireMessage>> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    wire.push(WireMessage::text(Role::System, system_prompt(target, tools)));

    for message in messages {
        if message.tool_call_id.is_some() && message.role != Role::Tool {
            return Err(GatewayError::MalformedRequest(
                "tool_call_id is only valid on tool messages".to_string(),
            ));
        }
        if message.tool_calls.is_some() && message.role != Role::Assistant {
            return Err(GatewayError::MalformedRequest(
                "tool_calls are only valid on assistant messages".to_string(),
            ));
        }

        let content = match message.image_url() {
            Some(url) => {
                if !target.supports_vision {
                    return Err(GatewayError::UnsupportedModality(format!(
                        "model target '{}' cannot accept image input",
                        target.id
                    )));
                }
                WireContent::Parts(vec![
                    ContentPart::Text {
                        text: message.content.clone(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageRef {
                            url: url.to_string(),
                        },
                    },
                ])
            }
            None => WireContent::Text(message.content.clone()),
        };

        wire.push(WireMessage {
            role: message.role,
            content,
            tool_calls: message.tool_calls.clone(),
            tool_call_id: message.tool_call_id.clone(),
        });
    }

    Ok(wire)
}

/// Convert tool definitions to the openai function-tool array.
pub fn tools_to_wire(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

/// The single tool the gateway exposes: image generation, gated behind an
/// explicit user request.
pub fn builtin_tools() -> Vec<ToolDefinition> {
    vec![ToolDefinition::new(
        "generate_image",
        "This function should be called rarely, and only when a user explicitly asks to generate an image, e.g a photograph or a logo",
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "A short description of the image to generate, best for logos and photographs"
                }
            }
        }),
    )]
}
