//! Single-shot artifact jobs: title summarization, image synthesis, and
//! text-to-speech. Each is one buffered provider exchange behind the same
//! rate-limit gate as chat; none produces partial output.

use crate::errors::{GatewayError, GatewayResult};
use crate::models::message::Role;
use crate::normalize::WireMessage;
use crate::providers::elevenlabs::{SpeechAudio, SpeechClient};
use crate::providers::openai::ChatClient;
use crate::providers::registry::ProviderRegistry;
use crate::storage::ObjectStore;

pub const TITLE_MODEL: &str = "gpt-3.5-turbo";
pub const IMAGE_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";

const TITLE_SYSTEM_PROMPT: &str = "\
You are a master wordsmith with the unique ability to distill lengthy messages into
concise summaries of just 1 to 4 words, capturing the essence of the original content
with precision and brevity. Your task is to skillfully compress extensive information
into a potent, minimal form while retaining the core meaning and impact.

Your response should be a single line, not using any dot points.

Your response should be in the same language as the user input.";

/// Summarize the opening message of a conversation into a 1-4 word title.
///
/// The output contract is strict: no leading or trailing whitespace and
/// never a newline, whatever the model produced.
pub async fn generate_title(
    chat: &ChatClient,
    registry: &ProviderRegistry,
    initial_message: &str,
) -> GatewayResult<String> {
    if initial_message.trim().is_empty() {
        return Err(GatewayError::MalformedRequest(
            "initialMessage must not be empty".to_string(),
        ));
    }

    let target = registry.select(TITLE_MODEL)?;
    let messages = vec![
        WireMessage::text(Role::System, TITLE_SYSTEM_PROMPT),
        WireMessage::text(Role::User, initial_message),
    ];

    let raw = chat
        .complete_text(target, TITLE_MODEL, &messages, None)
        .await?;
    Ok(single_line(&raw))
}

/// Synthesize an image for `prompt`, upload it under a fresh random key,
/// and return the public URL.
pub async fn generate_image(
    chat: &ChatClient,
    registry: &ProviderRegistry,
    store: &dyn ObjectStore,
    prompt: &str,
) -> GatewayResult<String> {
    if prompt.trim().is_empty() {
        return Err(GatewayError::MalformedRequest(
            "prompt must not be empty".to_string(),
        ));
    }

    let target = registry.select(IMAGE_MODEL)?;
    let bytes = chat.generate_image(target, IMAGE_MODEL, prompt).await?;

    let name = format!("{}.png", nanoid::nanoid!());
    let path = store.upload(&name, bytes, "image/png").await?;
    Ok(store.public_url(&path))
}

/// Turn `text` into speech, relaying the provider's audio bytes unmodified.
pub async fn synthesize_voice(speech: &SpeechClient, text: &str) -> GatewayResult<SpeechAudio> {
    if text.trim().is_empty() {
        return Err(GatewayError::MalformedRequest(
            "text must not be empty".to_string(),
        ));
    }
    speech.synthesize(text).await
}

/// Collapse the model output to one trimmed line: internal whitespace runs
/// (including newlines) become single spaces.
fn single_line(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
