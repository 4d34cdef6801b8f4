use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the model may call, described in json-schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, description: D, parameters: Value) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call echoed back by the client inside an assistant turn, in the
/// openai function-call wire shape. Carried through normalization verbatim
/// so multi-turn tool conversations stay coherent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    /// Raw JSON string, exactly as the provider produced it.
    pub arguments: String,
}

/// A complete tool invocation assembled by the relay from stream fragments.
/// Produced by a provider mid-stream, never by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON string; fragments may arrive split at arbitrary byte
    /// boundaries, so this is only parseable once the stream finishes it.
    pub arguments: String,
}
