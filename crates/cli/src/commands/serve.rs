//! `sproutline serve` — Start the HTTP gateway server.

use crate::commands::build_runtime;
use sproutline_config::AppConfig;
use sproutline_gateway::GatewayState;
use std::sync::Arc;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let runtime = build_runtime(&config).await?;

    println!("🌱 Sproutline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.model);
    println!("   Storage:   {}", runtime.storage.name());

    let state = Arc::new(GatewayState {
        orchestrator: runtime.orchestrator,
        storage: runtime.storage,
        client: runtime.client,
        model: config.model.clone(),
        start_time: chrono::Utc::now(),
    });

    sproutline_gateway::serve(&config, state).await?;
    Ok(())
}
