//! CompletionClient trait — the abstraction over the chat-completion endpoint.
//!
//! A CompletionClient knows how to send an ordered message list to an LLM
//! and get a single complete reply back. The pipeline makes exactly two
//! kinds of calls through it: the primary generation call and the
//! evaluator's scoring call. No streaming, no tool use, no retries.

use crate::error::CompletionError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The ordered conversation messages: [system, ...history, user]
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output-token ceiling for the generated reply
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

impl CompletionRequest {
    /// Build a request with the pipeline's message ordering:
    /// system prompt first, then prior turns in chronological order,
    /// then the latest user message.
    pub fn chat(
        model: impl Into<String>,
        system_prompt: &str,
        history: &[Message],
        user_text: &str,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(user_text));

        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Override the output-token ceiling.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

fn default_max_tokens() -> u32 {
    500
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// All-zero usage, used on trace rows for turns that never reached
    /// the model.
    pub fn zero() -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        }
    }
}

/// A complete response from the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReply {
    /// The generated text
    pub text: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// The upstream request/response identifier, kept for the trace log
    pub request_id: String,

    /// Token usage statistics
    pub usage: Usage,
}

/// The core CompletionClient trait.
///
/// The pipeline calls `complete()` without knowing which endpoint is
/// behind it — pure polymorphism. Upstream failures surface as a single
/// [`CompletionError`]; the caller decides whether to absorb or re-raise.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete reply.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionReply, CompletionError>;

    /// Health check — can we reach the endpoint?
    async fn health_check(&self) -> std::result::Result<bool, CompletionError> {
        Ok(true)
    }
}
