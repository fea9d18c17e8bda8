//! Storage trait — the relational store behind the pipeline and the
//! admin console.
//!
//! The pipeline reads the active knowledge/instruction subsets fresh per
//! turn (no cache) and writes messages and trace logs. The thin admin
//! surface (document/prompt CRUD, trace listing) shares the same trait.
//!
//! Implementations: SQLite (production), in-memory (tests/dev).
//! All methods are assumed to fail only on infrastructure errors, which
//! are propagated, never interpreted.

use crate::error::StorageError;
use crate::knowledge::{InstructionEntry, KnowledgeEntry};
use crate::message::{ConversationId, Message, Role};
use crate::trace::TraceRecord;
use async_trait::async_trait;

#[async_trait]
pub trait Storage: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Active knowledge entries, most recently created first.
    async fn active_documents(&self) -> std::result::Result<Vec<KnowledgeEntry>, StorageError>;

    /// Active instruction entries, most recently created first.
    async fn active_prompts(&self) -> std::result::Result<Vec<InstructionEntry>, StorageError>;

    /// All messages of a conversation in chronological order.
    async fn messages(
        &self,
        conversation: &ConversationId,
    ) -> std::result::Result<Vec<Message>, StorageError>;

    /// Append a message to a conversation, creating the conversation row
    /// if it does not exist yet.
    async fn append_message(
        &self,
        conversation: &ConversationId,
        role: Role,
        content: &str,
    ) -> std::result::Result<Message, StorageError>;

    /// Persist a write-once trace record. Returns its id.
    async fn record_trace(&self, record: TraceRecord) -> std::result::Result<String, StorageError>;

    // --- Admin console surface ---

    /// Create a knowledge-base document. Returns its id.
    async fn create_document(
        &self,
        entry: KnowledgeEntry,
    ) -> std::result::Result<String, StorageError>;

    /// All documents (active and inactive), most recently created first.
    async fn list_documents(&self) -> std::result::Result<Vec<KnowledgeEntry>, StorageError>;

    /// Delete a document by id. Returns `true` if it existed.
    async fn delete_document(&self, id: &str) -> std::result::Result<bool, StorageError>;

    /// Create an instruction entry. Returns its id.
    async fn create_prompt(
        &self,
        entry: InstructionEntry,
    ) -> std::result::Result<String, StorageError>;

    /// All instruction entries, most recently created first.
    async fn list_prompts(&self) -> std::result::Result<Vec<InstructionEntry>, StorageError>;

    /// Delete an instruction entry by id. Returns `true` if it existed.
    async fn delete_prompt(&self, id: &str) -> std::result::Result<bool, StorageError>;

    /// Most recent trace records, newest first.
    async fn list_traces(&self, limit: usize)
    -> std::result::Result<Vec<TraceRecord>, StorageError>;

    /// Delete a conversation and everything hanging off it (messages and
    /// trace records cascade). Returns `true` if it existed.
    async fn delete_conversation(
        &self,
        conversation: &ConversationId,
    ) -> std::result::Result<bool, StorageError>;
}
