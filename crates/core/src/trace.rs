//! Trace records — the per-turn audit artifact.
//!
//! One [`TraceRecord`] is written for every processed turn, success or
//! failure, capturing inputs, outputs, guardrail/evaluator results, and
//! timing. Records are write-once: never updated, deleted only by cascade
//! when their conversation is deleted.

use crate::completion::Usage;
use crate::message::ConversationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Model label recorded on turns blocked by the input guardrail,
/// where no model call was ever made.
pub const GUARDRAIL_INPUT_MODEL: &str = "guardrail-input";

/// Guardrail result recorded when the primary completion call failed.
pub const GUARDRAIL_RESULT_ERROR: &str = "error";

/// Guardrail result recorded on a fully successful turn.
pub const GUARDRAIL_RESULT_PASSED: &str = "passed";

/// The audit row written once per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Unique ID
    pub id: String,

    /// The conversation this turn belongs to (none for non-conversation turns)
    pub conversation_id: Option<ConversationId>,

    /// Upstream request id from the completion endpoint, if a call was made
    pub request_id: Option<String>,

    /// Model name, or [`GUARDRAIL_INPUT_MODEL`] if blocked before generation
    pub model: String,

    /// Prompt token count (zero if no model call was made)
    pub prompt_tokens: u32,

    /// Completion token count
    pub completion_tokens: u32,

    /// Total token count
    pub total_tokens: u32,

    /// Verbatim user text
    pub user_text: String,

    /// Verbatim assistant text, or none if blocked before generation
    pub assistant_text: Option<String>,

    /// Guardrail verdict description ("passed", "error", or the block reason)
    pub guardrail_result: String,

    /// Evaluator score in [0, 100], if the evaluator ran
    pub evaluator_score: Option<u8>,

    /// Evaluator feedback text; holds the upstream error message on failures
    pub evaluator_feedback: Option<String>,

    /// Whether this turn was blocked by a guardrail
    pub blocked: bool,

    /// Which rule blocked it
    pub block_reason: Option<String>,

    /// Wall-clock turn latency
    pub latency_ms: u64,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl TraceRecord {
    /// Start a record for a turn: unblocked, zero usage, no evaluator data.
    /// Builder methods fill in whatever the terminal state produced.
    pub fn new(model: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: None,
            request_id: None,
            model: model.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            user_text: user_text.into(),
            assistant_text: None,
            guardrail_result: GUARDRAIL_RESULT_PASSED.into(),
            evaluator_score: None,
            evaluator_feedback: None,
            blocked: false,
            block_reason: None,
            latency_ms: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_conversation(mut self, conversation: ConversationId) -> Self {
        self.conversation_id = Some(conversation);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.prompt_tokens = usage.prompt_tokens;
        self.completion_tokens = usage.completion_tokens;
        self.total_tokens = usage.total_tokens;
        self
    }

    pub fn with_assistant_text(mut self, text: impl Into<String>) -> Self {
        self.assistant_text = Some(text.into());
        self
    }

    pub fn with_guardrail_result(mut self, result: impl Into<String>) -> Self {
        self.guardrail_result = result.into();
        self
    }

    pub fn with_evaluation(mut self, score: u8, feedback: impl Into<String>) -> Self {
        self.evaluator_score = Some(score);
        self.evaluator_feedback = Some(feedback.into());
        self
    }

    /// Record an upstream error message in the feedback slot without
    /// setting a score.
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.evaluator_feedback = Some(feedback.into());
        self
    }

    pub fn blocked(mut self, reason: impl Into<String>) -> Self {
        self.blocked = true;
        self.block_reason = Some(reason.into());
        self
    }

    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency_ms = latency.as_millis() as u64;
        self
    }
}
