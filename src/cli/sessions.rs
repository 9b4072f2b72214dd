//! Session CLI command handlers.

use anyhow::{Context, Result};

use conductor::config::Config;
use conductor::session::SessionManager;

use super::SessionsAction;

pub(crate) async fn cmd_sessions(action: SessionsAction) -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let manager = SessionManager::new(&config);

    match action {
        SessionsAction::List => {
            let sessions = manager.list().await?;
            if sessions.is_empty() {
                println!("No sessions in {}", manager.storage_path().display());
                return Ok(());
            }
            for s in &sessions {
                println!(
                    "  {:<38} {:<28} {:>4} msgs  {}",
                    s.session_id,
                    s.model,
                    s.message_count,
                    s.last_updated.format("%Y-%m-%d %H:%M")
                );
            }
        }
        SessionsAction::Show { id, json } => {
            let record = manager.load(&id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
                return Ok(());
            }
            println!("Session {} ({})", record.session_id, record.model);
            println!(
                "{} messages, {} turns, {} tool calls",
                record.metadata.message_count,
                record.metadata.turn_count,
                record.metadata.tool_call_count
            );
            for message in &record.messages {
                println!("\n[{:?}]\n{}", message.role, message.text());
            }
        }
        SessionsAction::Delete { id } => {
            if manager.delete(&id).await? {
                println!("Deleted session {}", id);
            } else {
                println!("Session {} not found", id);
            }
        }
    }
    Ok(())
}
