//! Configuration management for Conductor
//!
//! Configuration is loaded from `~/.conductor/config.json` with environment
//! variable overrides. Defaults are resolved once, here; library constructors
//! take the resulting structs and never read the environment themselves.

mod types;
pub mod validate;

pub use types::*;
pub use validate::{validate_config, Diagnostic, DiagnosticLevel};

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ConductorError, Result};

impl Config {
    /// Returns the Conductor configuration directory path (~/.conductor)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".conductor")
    }

    /// Returns the path to the config file (~/.conductor/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                ConductorError::Config(format!("Invalid config {}: {}", path.display(), e))
            })?
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: CONDUCTOR_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CONDUCTOR_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Ok(val) = std::env::var("CONDUCTOR_AGENT_API_KEY") {
            self.agent.api_key = val;
        }
        if let Ok(val) = std::env::var("CONDUCTOR_AGENT_SYSTEM_PROMPT") {
            self.agent.system_prompt = Some(val);
        }
        if let Some(v) = parsed_env("CONDUCTOR_AGENT_MAX_TURNS") {
            self.agent.max_turns = v;
        }
        if let Some(v) = parsed_env("CONDUCTOR_AGENT_MAX_TOKENS") {
            self.agent.max_tokens = v;
        }
        if let Some(v) = parsed_env("CONDUCTOR_AGENT_TEMPERATURE") {
            self.agent.temperature = v;
        }
        if let Some(v) = parsed_env("CONDUCTOR_AGENT_MAX_CONTEXT_LENGTH") {
            self.agent.max_context_length = v;
        }
        if let Some(v) = parsed_env("CONDUCTOR_AGENT_COMPRESSION_ENABLED") {
            self.agent.compression_enabled = v;
        }

        if let Ok(val) = std::env::var("CONDUCTOR_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CONDUCTOR_LOG_FORMAT") {
            match val.as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "compact" => self.logging.format = LogFormat::Compact,
                other => warn!(value = other, "Ignoring unknown CONDUCTOR_LOG_FORMAT"),
            }
        }

        if let Some(v) = parsed_env("CONDUCTOR_SWARM_MAX_CONCURRENT") {
            self.swarm.max_concurrent = v;
        }
        if let Some(v) = parsed_env("CONDUCTOR_SESSIONS_PERSIST") {
            self.sessions.persist = v;
        }
        if let Some(v) = parsed_env("CONDUCTOR_BUDGET_MAX_TOKENS") {
            self.budget.max_tokens = Some(v);
        }
        if let Some(v) = parsed_env("CONDUCTOR_BUDGET_MAX_COST") {
            self.budget.max_cost = Some(v);
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory used for persisted sessions.
    pub fn sessions_dir(&self) -> PathBuf {
        match &self.sessions.directory {
            Some(dir) => expand_home(dir),
            None => Self::dir().join("sessions"),
        }
    }
}

impl McpConfig {
    /// Load a standalone MCP server file (`{"mcpServers": {...}}`).
    ///
    /// A missing file yields an empty config.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "MCP config not found, no servers configured");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ConductorError::Config(format!("Invalid MCP config {}: {}", path.display(), e))
        })
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

/// Expand `~/` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.agent.max_turns, 30);
        assert_eq!(config.agent.max_context_length, 100_000);
        assert!(config.agent.compression_enabled);
        assert!(config.mcp.servers.is_empty());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.budget.warn_at_percent, 80.0);
    }

    #[test]
    fn test_config_partial_json() {
        let config: Config =
            serde_json::from_str(r#"{"agent": {"model": "m1", "max_turns": 5}}"#).unwrap();
        assert_eq!(config.agent.model, "m1");
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.agent.max_tokens, 4096);
    }

    #[test]
    fn test_mcp_config_names_from_keys() {
        let config: McpConfig = serde_json::from_str(
            r#"{"mcpServers": {
                "files": {"command": "mcp-files", "args": ["--root", "."]},
                "remote": {"url": "https://example.com/mcp", "headers": {"Authorization": "Bearer x"}},
                "events": {"transport": "sse", "url": "https://example.com/sse"}
            }}"#,
        )
        .unwrap();

        let servers = config.server_configs();
        assert_eq!(servers.len(), 3);
        let events = &servers[0];
        assert_eq!(events.name, "events");
        assert_eq!(events.transport_kind(), TransportKind::Sse);
        let files = config.server("files").unwrap();
        assert_eq!(files.transport_kind(), TransportKind::Stdio);
        assert_eq!(files.args, vec!["--root", "."]);
        assert_eq!(files.timeout_secs, 30);
        let remote = config.server("remote").unwrap();
        assert_eq!(remote.transport_kind(), TransportKind::Http);
    }

    #[test]
    fn test_mcp_config_servers_alias() {
        let config: McpConfig =
            serde_json::from_str(r#"{"servers": {"a": {"command": "x"}}}"#).unwrap();
        assert!(config.server("a").is_some());
    }

    #[test]
    fn test_mcp_config_missing_file() {
        let config = McpConfig::load_from_path(Path::new("/nonexistent/.mcp.json")).unwrap();
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_mcp_config_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".mcp.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = McpConfig::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConductorError::Config(_)));
    }

    #[test]
    fn test_env_override() {
        env::set_var("CONDUCTOR_AGENT_MODEL", "test-model");
        env::set_var("CONDUCTOR_AGENT_MAX_TURNS", "7");
        env::set_var("CONDUCTOR_AGENT_TEMPERATURE", "not-a-number");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.agent.model, "test-model");
        assert_eq!(config.agent.max_turns, 7);
        assert_eq!(config.agent.temperature, 0.7);

        env::remove_var("CONDUCTOR_AGENT_MODEL");
        env::remove_var("CONDUCTOR_AGENT_MAX_TURNS");
        env::remove_var("CONDUCTOR_AGENT_TEMPERATURE");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.agent.system_prompt = Some("Be brief".to_string());
        config.swarm.max_concurrent = 3;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.agent.system_prompt.as_deref(), Some("Be brief"));
        assert_eq!(loaded.swarm.max_concurrent, 3);
    }

    #[test]
    fn test_load_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.json")).unwrap();
        assert_eq!(config.agent.max_context_length, 100_000);
        assert!(config.mcp.servers.is_empty());
    }

    #[test]
    fn test_config_dir() {
        assert!(Config::dir().ends_with(".conductor"));
        assert!(Config::path().ends_with("config.json"));
    }

    #[test]
    fn test_sessions_dir_override() {
        let mut config = Config::default();
        assert!(config.sessions_dir().ends_with("sessions"));
        config.sessions.directory = Some("/tmp/conductor-sessions".into());
        assert_eq!(config.sessions_dir(), PathBuf::from("/tmp/conductor-sessions"));
    }
}
