//! Reply evaluator — scores each assistant reply with a second model call.
//!
//! The evaluator is advisory: its score lands in the trace log and nowhere
//! else. It therefore never fails a turn — any upstream or parse problem
//! degrades to a fixed fallback score.

use serde_json::Value;
use sproutline_core::completion::{CompletionClient, CompletionRequest};
use sproutline_core::message::Message;
use std::sync::Arc;
use tracing::{debug, warn};

/// Scoring rubric sent as the evaluator's system prompt.
const RUBRIC: &str = "\
You are a quality evaluator for a daycare customer-support assistant.
Score the assistant's reply from 0 to 100 using these weights:

- 10 points: the reply thanks the parent or acknowledges their question
- 30 points: the reply is accurate with respect to the provided context
- 25 points: the reply is helpful and actually answers the question
- 15 points: the tone is warm, concise, and professional
- 20 points: the reply follows compliance rules; score this component 0
  if the reply contains any personal identifying information

Respond with ONLY a JSON object: {\"score\": <number>, \"feedback\": \"<one sentence>\"}";

/// Score recorded when the evaluator call or its output parse fails.
pub const FALLBACK_SCORE: u8 = 70;

const FALLBACK_FEEDBACK: &str = "Evaluation unavailable; default score assigned.";

/// The outcome of evaluating one assistant reply.
#[derive(Debug, Clone)]
pub enum Evaluation {
    /// The evaluator responded with a parseable score.
    Scored {
        score: u8,
        feedback: String,
        request_id: String,
    },
    /// The call failed or the reply was not parseable; fixed fallback.
    Unavailable { score: u8, feedback: String },
}

impl Evaluation {
    fn unavailable() -> Self {
        Self::Unavailable {
            score: FALLBACK_SCORE,
            feedback: FALLBACK_FEEDBACK.into(),
        }
    }

    pub fn score(&self) -> u8 {
        match self {
            Self::Scored { score, .. } | Self::Unavailable { score, .. } => *score,
        }
    }

    pub fn feedback(&self) -> &str {
        match self {
            Self::Scored { feedback, .. } | Self::Unavailable { feedback, .. } => feedback,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Scored { request_id, .. } => Some(request_id),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Scores assistant replies against the rubric.
pub struct Evaluator {
    client: Arc<dyn CompletionClient>,
    model: String,
    max_tokens: u32,
}

impl Evaluator {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: 200,
        }
    }

    /// Score one exchange. Infallible by contract: every failure path
    /// returns [`Evaluation::Unavailable`].
    pub async fn evaluate(&self, user_text: &str, assistant_text: &str) -> Evaluation {
        let exchange = format!(
            "Parent's question:\n{user_text}\n\nAssistant's reply:\n{assistant_text}"
        );
        let request = CompletionRequest::chat(&self.model, RUBRIC, &[], &exchange)
            .with_max_tokens(self.max_tokens);

        let reply = match self.client.complete(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Evaluator call failed, using fallback score");
                return Evaluation::unavailable();
            }
        };

        match parse_score(&reply.text) {
            Some((score, feedback)) => {
                debug!(score, "Evaluator scored reply");
                Evaluation::Scored {
                    score,
                    feedback,
                    request_id: reply.request_id,
                }
            }
            None => {
                warn!(text = %reply.text, "Evaluator reply was not parseable, using fallback score");
                Evaluation::unavailable()
            }
        }
    }
}

/// Extract `{"score": n, "feedback": "..."}` from the evaluator's text.
///
/// Models wrap JSON in prose or code fences often enough that we take the
/// substring from the first `{` to the last `}` before parsing. Scores are
/// clamped to [0, 100]; a missing score field fails the parse, a missing
/// feedback field does not.
fn parse_score(text: &str) -> Option<(u8, String)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
    let score = value.get("score")?.as_f64()?;
    let score = score.clamp(0.0, 100.0) as u8;
    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((score, feedback))
}
