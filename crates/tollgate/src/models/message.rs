use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Attachment data riding along with a message, as sent by chat interfaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A single conversation turn as received from the client.
///
/// `tool_calls` may only appear on assistant turns and `tool_call_id` only
/// on tool turns; the normalizer rejects anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ConversationMessage {
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        ConversationMessage {
            role,
            content: content.into(),
            data: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Attach an image reference to the message
    pub fn with_image_url<S: Into<String>>(mut self, url: S) -> Self {
        self.data = Some(MessageData {
            image_url: Some(url.into()),
        });
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    pub fn with_tool_call_id<S: Into<String>>(mut self, id: S) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    /// The image URL carried in the attachment data, if any
    pub fn image_url(&self) -> Option<&str> {
        self.data.as_ref()?.image_url.as_deref()
    }
}
