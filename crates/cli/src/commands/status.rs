//! `sproutline status` — Show system status.

use sproutline_config::AppConfig;
use sproutline_core::completion::CompletionClient;
use sproutline_providers::OpenAiCompatClient;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🌱 Sproutline Status");
    println!("===================");
    println!("  Workspace:   {}", AppConfig::workspace_dir().display());
    println!("  Model:       {}", config.model);
    println!("  Evaluator:   {}", config.evaluator_model);
    println!("  Max tokens:  {}", config.max_tokens);
    println!("  Storage:     {}", config.storage.backend);
    if config.storage.backend == "sqlite" {
        println!("  Database:    {}", config.storage.database_path().display());
    }
    println!(
        "  Gateway:     {}:{}",
        config.gateway.host, config.gateway.port
    );

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `sproutline init` first");
    }

    match &config.api_key {
        Some(key) => {
            let client = OpenAiCompatClient::new("openai", &config.base_url, key.clone());
            match client.health_check().await {
                Ok(true) => println!("  ✅ Completion endpoint reachable"),
                Ok(false) => println!("  ⚠️  Completion endpoint responded with an error"),
                Err(e) => println!("  ❌ Completion endpoint unreachable: {e}"),
            }
        }
        None => println!("  ⚠️  No API key configured"),
    }

    Ok(())
}
