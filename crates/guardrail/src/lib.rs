//! Pattern guardrail — stateless content checks on chat turns.
//!
//! Two pure checks, applied by the orchestrator around the model call:
//! - input: reject PII-shaped text (SSN, phone, email, street address)
//!   and prompt-injection phrases before anything reaches the model;
//! - output: reject generated replies that leak PII patterns or discuss
//!   sensitive topics without a safe-harbor phrase.
//!
//! No state, no I/O, deterministic. Rule data is immutable configuration
//! injected at construction, so rules are testable and replaceable
//! without touching orchestration logic.

pub mod engine;
pub mod rules;

pub use engine::{PatternGuardrail, Verdict};
pub use rules::GuardrailRules;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("Failed to parse guardrail rules: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid guardrail rules: {0}")]
    InvalidRules(String),
}
