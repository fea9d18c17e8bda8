//! CLI command implementations.

pub mod chat;
pub mod init;
pub mod serve;
pub mod status;

use sproutline_config::AppConfig;
use sproutline_core::completion::CompletionClient;
use sproutline_core::storage::Storage;
use sproutline_guardrail::PatternGuardrail;
use sproutline_pipeline::{Evaluator, PromptComposer, TurnOrchestrator};
use sproutline_providers::OpenAiCompatClient;
use sproutline_storage::{InMemoryStorage, SqliteStorage};
use std::sync::Arc;

/// Everything `serve` and `chat` need, assembled from the config.
pub(crate) struct Runtime {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub storage: Arc<dyn Storage>,
    pub client: Arc<dyn CompletionClient>,
}

pub(crate) async fn build_runtime(
    config: &AppConfig,
) -> Result<Runtime, Box<dyn std::error::Error>> {
    let storage: Arc<dyn Storage> = match config.storage.backend.as_str() {
        "memory" => Arc::new(InMemoryStorage::new()),
        _ => {
            std::fs::create_dir_all(AppConfig::workspace_dir())?;
            let path = config.storage.database_path();
            let path = path.to_str().ok_or("database path is not valid UTF-8")?;
            Arc::new(SqliteStorage::new(path).await?)
        }
    };

    let api_key = config.api_key.clone().ok_or(
        "No API key configured — set SPROUTLINE_API_KEY or api_key in config.toml",
    )?;
    let client: Arc<dyn CompletionClient> =
        Arc::new(OpenAiCompatClient::new("openai", &config.base_url, api_key));

    let orchestrator = Arc::new(
        TurnOrchestrator::new(
            PatternGuardrail::with_defaults(),
            PromptComposer::new(storage.clone()),
            client.clone(),
            Evaluator::new(client.clone(), &config.evaluator_model),
            storage.clone(),
            &config.model,
        )
        .with_max_tokens(config.max_tokens),
    );

    Ok(Runtime {
        orchestrator,
        storage,
        client,
    })
}
