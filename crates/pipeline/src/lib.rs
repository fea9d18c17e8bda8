//! The per-turn message pipeline.
//!
//! Every user message passes through the same fixed sequence:
//!
//! 1. Pattern guardrail on the input
//! 2. Prompt composition from the live knowledge base
//! 3. One completion call
//! 4. Pattern guardrail on the output
//! 5. Evaluation and persistence
//!
//! [`TurnOrchestrator`] drives the sequence and writes exactly one trace
//! record per turn, whichever way the turn ends.

pub mod composer;
pub mod evaluator;
pub mod orchestrator;

pub use composer::PromptComposer;
pub use evaluator::{Evaluation, Evaluator, FALLBACK_SCORE};
pub use orchestrator::{CannedReplies, TurnOrchestrator, TurnOutcome};
