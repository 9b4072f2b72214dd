//! MCP CLI command handlers - server discovery and one-off tool calls.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::warn;

use conductor::config::{Config, McpConfig, McpServerConfig};
use conductor::tools::mcp::McpClient;

use super::McpAction;

pub(crate) async fn cmd_mcp(action: McpAction) -> Result<()> {
    match action {
        McpAction::Tools { config, server } => {
            let client = connect(config, server.as_deref()).await?;
            let tools = client.tools().await;
            if tools.is_empty() {
                println!("No tools discovered.");
            }
            for (key, tool) in &tools {
                println!("  {:<32} {}", key, tool.description);
            }
            println!("\n{} tool(s)", tools.len());
            client.disconnect_all().await;
        }
        McpAction::Call {
            server,
            tool,
            args,
            config,
        } => {
            let input: Value =
                serde_json::from_str(&args).context("--args must be a JSON object")?;
            if !input.is_object() {
                bail!("--args must be a JSON object");
            }
            let client = connect(config, Some(&server)).await?;
            let result = client.call_tool(&server, &tool, input).await;
            client.disconnect_all().await;
            let result = result.with_context(|| format!("Calling {}:{}", server, tool))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        McpAction::Resources { config, server } => {
            let client = connect(config, server.as_deref()).await?;
            let resources = client.resources().await;
            let prompts = client.prompts().await;
            println!("Resources:");
            for (key, resource) in &resources {
                println!("  {:<40} {}", key, resource.name);
            }
            println!("Prompts:");
            for (key, prompt) in &prompts {
                println!(
                    "  {:<40} {}",
                    key,
                    prompt.description.as_deref().unwrap_or("")
                );
            }
            client.disconnect_all().await;
        }
    }
    Ok(())
}

fn server_configs(path: Option<PathBuf>, only: Option<&str>) -> Result<Vec<McpServerConfig>> {
    let mcp = match path {
        Some(path) => McpConfig::load_from_path(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load().context("Failed to load config")?.mcp,
    };
    match only {
        Some(name) => match mcp.server(name) {
            Some(server) => Ok(vec![server]),
            None => bail!("No MCP server named '{}' in config", name),
        },
        None => Ok(mcp.server_configs()),
    }
}

/// Connect every selected server; failures are reported and skipped.
async fn connect(path: Option<PathBuf>, only: Option<&str>) -> Result<McpClient> {
    let servers = server_configs(path, only)?;
    if servers.is_empty() {
        bail!("No MCP servers configured");
    }

    let client = McpClient::new();
    for server in &servers {
        match client.connect(server).await {
            Ok(()) => println!("[OK] {} ({})", server.name, server.transport_kind()),
            Err(e) => {
                warn!(server = %server.name, error = %e, "Connect failed");
                println!("[ERROR] {}: {}", server.name, e);
            }
        }
    }
    Ok(client)
}
