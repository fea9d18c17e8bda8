//! Prompt composer — assembles the system prompt for each turn.
//!
//! The prompt is rebuilt from storage on every turn so admin edits to the
//! knowledge base take effect on the very next message, no restart and no
//! cache invalidation.

use sproutline_core::error::StorageError;
use sproutline_core::storage::Storage;
use std::sync::Arc;
use tracing::debug;

/// The fixed persona block that opens every system prompt.
pub const DEFAULT_PERSONA: &str = "\
You are Sprout, the friendly virtual assistant for Little Sprouts Daycare.

Your role:
- Answer parents' questions about the facility using ONLY the facility
  knowledge base below.
- Be warm, concise, and professional. Parents are often busy or stressed.
- If a question is not covered by the knowledge base, say so and suggest
  calling the front desk.

Rules you must always follow:
- Never ask for, repeat, or store personal identifying information such
  as Social Security numbers, phone numbers, email addresses, or home
  addresses.
- Never give medical, legal, or financial advice.
- If a message is unrelated to the daycare, reply exactly: \"I can only \
help with questions about Little Sprouts Daycare.\"";

/// Builds the per-turn system prompt from the persona and the active
/// knowledge/instruction entries.
pub struct PromptComposer {
    storage: Arc<dyn Storage>,
    persona: String,
}

impl PromptComposer {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            persona: DEFAULT_PERSONA.into(),
        }
    }

    /// Replace the default persona block.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Assemble the system prompt: persona, then the knowledge-base
    /// section (always present, even when empty), then the additional
    /// instructions section (omitted entirely when there are none).
    pub async fn build_system_prompt(&self) -> Result<String, StorageError> {
        let documents = self.storage.active_documents().await?;
        let prompts = self.storage.active_prompts().await?;

        let mut out = String::from(&self.persona);

        out.push_str("\n\nFACILITY KNOWLEDGE BASE:\n");
        let entries: Vec<String> = documents
            .iter()
            .map(|d| format!("--- {} ({}) ---\n{}", d.title, d.category, d.body))
            .collect();
        out.push_str(&entries.join("\n\n"));

        if !prompts.is_empty() {
            out.push_str("\n\nADDITIONAL INSTRUCTIONS:\n");
            let bodies: Vec<&str> = prompts.iter().map(|p| p.body.as_str()).collect();
            out.push_str(&bodies.join("\n\n"));
        }

        debug!(
            documents = documents.len(),
            instructions = prompts.len(),
            "Composed system prompt"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sproutline_core::knowledge::{InstructionEntry, InstructionKind, KnowledgeEntry};
    use sproutline_storage::InMemoryStorage;

    #[tokio::test]
    async fn prompt_contains_persona_and_document_sections() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .create_document(KnowledgeEntry::new(
                "Hours",
                "Open 6:30am to 6:30pm, Monday through Friday.",
                "operations",
            ))
            .await
            .unwrap();

        let composer = PromptComposer::new(storage);
        let prompt = composer.build_system_prompt().await.unwrap();

        assert!(prompt.starts_with("You are Sprout"));
        assert!(prompt.contains("FACILITY KNOWLEDGE BASE:"));
        assert!(prompt.contains("--- Hours (operations) ---\nOpen 6:30am to 6:30pm"));
    }

    #[tokio::test]
    async fn knowledge_section_present_even_when_empty() {
        let storage = Arc::new(InMemoryStorage::new());
        let composer = PromptComposer::new(storage);
        let prompt = composer.build_system_prompt().await.unwrap();
        assert!(prompt.contains("FACILITY KNOWLEDGE BASE:"));
    }

    #[tokio::test]
    async fn instructions_section_omitted_when_none_active() {
        let storage = Arc::new(InMemoryStorage::new());
        let composer = PromptComposer::new(storage);
        let prompt = composer.build_system_prompt().await.unwrap();
        assert!(!prompt.contains("ADDITIONAL INSTRUCTIONS"));
    }

    #[tokio::test]
    async fn instructions_section_joins_bodies() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .create_prompt(InstructionEntry::new(
                "tone",
                "Keep replies under three sentences.",
                InstructionKind::Behavior,
            ))
            .await
            .unwrap();
        storage
            .create_prompt(InstructionEntry::new(
                "signoff",
                "End with an offer to help further.",
                InstructionKind::Behavior,
            ))
            .await
            .unwrap();

        let composer = PromptComposer::new(storage);
        let prompt = composer.build_system_prompt().await.unwrap();
        assert!(prompt.contains("ADDITIONAL INSTRUCTIONS:"));
        assert!(prompt.contains("Keep replies under three sentences."));
        assert!(prompt.contains("End with an offer to help further."));
        // Names and kinds are admin metadata, not prompt text.
        assert!(!prompt.contains("signoff"));
    }

    #[tokio::test]
    async fn composition_is_deterministic_for_fixed_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .create_document(KnowledgeEntry::new("Tuition", "$320/week", "billing"))
            .await
            .unwrap();
        let composer = PromptComposer::new(storage);

        let a = composer.build_system_prompt().await.unwrap();
        let b = composer.build_system_prompt().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn custom_persona_replaces_default() {
        let storage = Arc::new(InMemoryStorage::new());
        let composer = PromptComposer::new(storage).with_persona("You are a test bot.");
        let prompt = composer.build_system_prompt().await.unwrap();
        assert!(prompt.starts_with("You are a test bot."));
        assert!(!prompt.contains("Little Sprouts"));
    }
}
