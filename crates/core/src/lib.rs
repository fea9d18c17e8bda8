//! # Sproutline Core
//!
//! Domain types, traits, and error definitions for the Sproutline
//! support-chat backend. This crate has **zero framework dependencies** —
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators of the turn pipeline — the completion
//! endpoint and the relational store — are defined as traits here.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod completion;
pub mod error;
pub mod knowledge;
pub mod message;
pub mod storage;
pub mod trace;

// Re-export key types at crate root for ergonomics
pub use completion::{CompletionClient, CompletionReply, CompletionRequest, Usage};
pub use error::{Error, Result};
pub use knowledge::{InstructionEntry, InstructionKind, KnowledgeEntry};
pub use message::{ConversationId, Message, Role};
pub use storage::Storage;
pub use trace::TraceRecord;
