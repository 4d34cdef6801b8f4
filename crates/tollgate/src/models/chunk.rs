use serde::Serialize;

/// Why the provider stopped producing tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other,
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        }
    }
}

/// One fragment of a tool call as it arrives on the stream. `id` and `name`
/// show up on the first fragment for an index; `arguments` dribble in across
/// any number of later fragments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One ordered element of a relayed response. The `delta_text` values of all
/// chunks for a response concatenate to the final full text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_delta: Option<ToolCallDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn text<S: Into<String>>(text: S) -> Self {
        StreamChunk {
            delta_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        StreamChunk {
            tool_call_delta: Some(delta),
            ..Default::default()
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        StreamChunk {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }
}
