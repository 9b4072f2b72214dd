//! Config show/check command handlers.

use anyhow::{Context, Result};

use conductor::config::{validate_config, Config, DiagnosticLevel};

use super::ConfigAction;

const REDACTED: &str = "********";

pub(crate) async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = Config::load().context("Failed to load config")?;
            if !config.agent.api_key.is_empty() {
                config.agent.api_key = REDACTED.to_string();
            }
            for server in config.mcp.servers.values_mut() {
                for value in server.env.values_mut().chain(server.headers.values_mut()) {
                    *value = REDACTED.to_string();
                }
            }
            println!("# {}", Config::path().display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Check => {
            let config_path = Config::path();
            println!("Config file: {}", config_path.display());

            if !config_path.exists() {
                println!("[OK] No config file found (using defaults)");
                return Ok(());
            }

            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;

            let raw: serde_json::Value = match serde_json::from_str(&content) {
                Ok(v) => v,
                Err(e) => {
                    println!("[ERROR] Invalid JSON: {}", e);
                    return Ok(());
                }
            };

            let diagnostics = validate_config(&raw);
            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Warn)
                .count();

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
        }
    }
    Ok(())
}
