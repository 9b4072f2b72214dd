//! Configuration validation with unknown field detection.
//!
//! Known field names come from serializing [`Config::default`], so the list
//! never drifts from the structs.

use std::collections::BTreeSet;

use serde_json::Value;

use super::{Config, TransportKind};

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Edit distance between two field names.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

/// Closest known name within distance 3.
pub fn suggest_field<'a>(unknown: &str, known: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    known
        .into_iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| k)
}

fn keys_of(value: &Value) -> BTreeSet<String> {
    value
        .as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

fn check_keys(
    section: &Value,
    known: &BTreeSet<String>,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let mut clean = true;
    for key in keys_of(section) {
        if known.contains(&key) {
            continue;
        }
        clean = false;
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let message = match suggest_field(&key, known.iter().map(String::as_str)) {
            Some(s) => format!("Unknown field '{}' (did you mean '{}'?)", key, s),
            None => format!("Unknown field '{}'", key),
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, path, message));
    }
    clean
}

/// Validate a raw JSON config: unknown fields at the top level and inside
/// each section, plus MCP server entries.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if !raw.is_object() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "",
            "Config must be a JSON object",
        ));
        return diagnostics;
    }
    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let defaults = serde_json::to_value(Config::default()).unwrap_or(Value::Null);
    let mut clean = check_keys(raw, &keys_of(&defaults), "", &mut diagnostics);

    for (name, section) in raw.as_object().into_iter().flatten() {
        if !section.is_object() {
            continue;
        }
        let mut known = keys_of(&defaults[name.as_str()]);
        if name == "mcp" {
            known.insert("servers".to_string());
        }
        clean &= check_keys(section, &known, name, &mut diagnostics);
    }

    if clean {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    match serde_json::from_value::<Config>(raw.clone()) {
        Ok(config) => diagnostics.extend(validate_semantics(&config)),
        Err(e) => diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, "", e.to_string())),
    }
    diagnostics
}

/// Checks on a parsed config that serde cannot express.
pub fn validate_semantics(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.agent.model.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "agent.model",
            "Model must not be empty",
        ));
    }
    if config.agent.api_key.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "agent.api_key",
            "Not set; provide it in the file or via CONDUCTOR_AGENT_API_KEY",
        ));
    }
    if config.agent.max_turns == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "agent.max_turns",
            "Must be at least 1",
        ));
    }
    if !(0.0..=2.0).contains(&config.agent.temperature) {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "agent.temperature",
            format!("{} is outside 0.0..=2.0", config.agent.temperature),
        ));
    }

    for server in config.mcp.server_configs() {
        let path = format!("mcp.mcpServers.{}", server.name);
        match server.transport_kind() {
            TransportKind::Stdio if server.command.is_none() => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticLevel::Error,
                    path,
                    "stdio transport requires 'command'",
                ));
            }
            TransportKind::Http | TransportKind::Sse if server.url.is_none() => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticLevel::Error,
                    path,
                    format!("{} transport requires 'url'", server.transport_kind()),
                ));
            }
            _ => {}
        }
    }
    diagnostics
}
