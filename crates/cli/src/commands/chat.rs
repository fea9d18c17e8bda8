//! `sproutline chat` — Send one message through the full pipeline.
//!
//! Runs an ephemeral turn: guardrails and generation, but nothing is
//! persisted and no evaluator call is made. Useful as a smoke test.

use crate::commands::build_runtime;
use sproutline_config::AppConfig;

pub async fn run(message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let runtime = build_runtime(&config).await?;

    let outcome = runtime
        .orchestrator
        .process_ephemeral_turn(message, &[])
        .await?;

    println!("{}", outcome.reply);
    if outcome.blocked {
        if let Some(reason) = outcome.block_reason {
            eprintln!("(blocked: {reason})");
        }
    }
    Ok(())
}
