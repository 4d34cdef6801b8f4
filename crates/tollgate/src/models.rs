//! These models represent the objects passed through the gateway
//!
//! There are a few related formats in play:
//! - useChat-style messages sent from the interface, where an image
//!   attachment rides along in a `data` field next to plain string content
//! - openai-compatible messages/tools, sent from the gateway to the LLM
//! - openai-compatible streaming chunks, decoded from the provider SSE feed
//!
//! Inbound shapes are converted into the wire format once, in the
//! normalizer; stream chunks are decoded into `StreamChunk` by the relay.
pub mod chunk;
pub mod message;
pub mod tool;
