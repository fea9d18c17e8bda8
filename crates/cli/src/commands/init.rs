//! `sproutline init` — Initialize configuration and workspace.

use sproutline_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = AppConfig::workspace_dir();
    std::fs::create_dir_all(&workspace)?;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("🌱 Config already exists at {}", config_path.display());
        return Ok(());
    }

    let config = AppConfig::default();
    std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;

    println!("🌱 Sproutline initialized");
    println!("   Workspace: {}", workspace.display());
    println!("   Config:    {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set your API key: export SPROUTLINE_API_KEY=sk-...");
    println!("     (or add `api_key = \"sk-...\"` to config.toml)");
    println!("  2. Start the gateway: sproutline serve");
    Ok(())
}
