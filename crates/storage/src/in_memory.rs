//! In-memory backend — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use sproutline_core::error::StorageError;
use sproutline_core::knowledge::{InstructionEntry, KnowledgeEntry};
use sproutline_core::message::{ConversationId, Message, Role};
use sproutline_core::storage::Storage;
use sproutline_core::trace::TraceRecord;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An in-memory backend that stores everything in Vecs and a HashMap.
/// Useful for tests and sessions where persistence isn't needed.
#[derive(Default)]
pub struct InMemoryStorage {
    documents: RwLock<Vec<KnowledgeEntry>>,
    prompts: RwLock<Vec<InstructionEntry>>,
    messages: RwLock<HashMap<String, Vec<Message>>>,
    traces: RwLock<Vec<TraceRecord>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored trace records (test helper).
    pub async fn trace_count(&self) -> usize {
        self.traces.read().await.len()
    }
}

/// Newest first: stable sort on creation time, ties keep reverse
/// insertion order.
fn newest_first<T>(items: &[T], created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T>
where
    T: Clone,
{
    let mut out: Vec<T> = items.iter().rev().cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

#[async_trait]
impl Storage for InMemoryStorage {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn active_documents(&self) -> Result<Vec<KnowledgeEntry>, StorageError> {
        let documents = self.documents.read().await;
        let active: Vec<KnowledgeEntry> =
            documents.iter().filter(|d| d.active).cloned().collect();
        Ok(newest_first(&active, |d| d.created_at))
    }

    async fn active_prompts(&self) -> Result<Vec<InstructionEntry>, StorageError> {
        let prompts = self.prompts.read().await;
        let active: Vec<InstructionEntry> = prompts.iter().filter(|p| p.active).cloned().collect();
        Ok(newest_first(&active, |p| p.created_at))
    }

    async fn messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, StorageError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&conversation.0).cloned().unwrap_or_default())
    }

    async fn append_message(
        &self,
        conversation: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StorageError> {
        let message = match role {
            Role::User => Message::user(content),
            Role::Assistant => Message::assistant(content),
            Role::System => Message::system(content),
        };
        self.messages
            .write()
            .await
            .entry(conversation.0.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn record_trace(&self, record: TraceRecord) -> Result<String, StorageError> {
        let id = record.id.clone();
        self.traces.write().await.push(record);
        Ok(id)
    }

    async fn create_document(&self, entry: KnowledgeEntry) -> Result<String, StorageError> {
        let id = entry.id.clone();
        self.documents.write().await.push(entry);
        Ok(id)
    }

    async fn list_documents(&self) -> Result<Vec<KnowledgeEntry>, StorageError> {
        let documents = self.documents.read().await;
        Ok(newest_first(&documents, |d| d.created_at))
    }

    async fn delete_document(&self, id: &str) -> Result<bool, StorageError> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| d.id != id);
        Ok(documents.len() < before)
    }

    async fn create_prompt(&self, entry: InstructionEntry) -> Result<String, StorageError> {
        let id = entry.id.clone();
        self.prompts.write().await.push(entry);
        Ok(id)
    }

    async fn list_prompts(&self) -> Result<Vec<InstructionEntry>, StorageError> {
        let prompts = self.prompts.read().await;
        Ok(newest_first(&prompts, |p| p.created_at))
    }

    async fn delete_prompt(&self, id: &str) -> Result<bool, StorageError> {
        let mut prompts = self.prompts.write().await;
        let before = prompts.len();
        prompts.retain(|p| p.id != id);
        Ok(prompts.len() < before)
    }

    async fn list_traces(&self, limit: usize) -> Result<Vec<TraceRecord>, StorageError> {
        let traces = self.traces.read().await;
        let mut out: Vec<TraceRecord> = traces.iter().rev().cloned().collect();
        out.truncate(limit);
        Ok(out)
    }

    async fn delete_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<bool, StorageError> {
        let existed = self.messages.write().await.remove(&conversation.0).is_some();
        // Trace records cascade with their conversation.
        self.traces
            .write()
            .await
            .retain(|t| t.conversation_id.as_ref() != Some(conversation));
        Ok(existed)
    }
}
