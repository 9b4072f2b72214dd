//! Tool permission policy.
//!
//! Decides which tool names the reasoning loop may advertise and execute.

use serde::{Deserialize, Serialize};

use super::ToolCall;

/// How `allowed` and `blocked` are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStrategy {
    /// Everything except `blocked`.
    #[default]
    All,
    /// Only names in `allowed`.
    Allowlist,
    /// Everything except `blocked`.
    Blocklist,
}

/// Allow/block policy for tool names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPermissions {
    pub strategy: PermissionStrategy,
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
}

impl ToolPermissions {
    /// Policy that allows only the given names.
    pub fn allowlist<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            strategy: PermissionStrategy::Allowlist,
            allowed: names.into_iter().map(Into::into).collect(),
            blocked: Vec::new(),
        }
    }

    /// Policy that allows everything except the given names.
    pub fn blocklist<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            strategy: PermissionStrategy::Blocklist,
            allowed: Vec::new(),
            blocked: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        match self.strategy {
            PermissionStrategy::Allowlist => self.allowed.iter().any(|n| n == name),
            PermissionStrategy::All | PermissionStrategy::Blocklist => {
                !self.blocked.iter().any(|n| n == name)
            }
        }
    }

    /// Keep the allowed names, preserving order.
    pub fn filter_allowed<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        names.into_iter().filter(|n| self.is_allowed(n)).collect()
    }

    /// Split calls into `(allowed, denied)`, both in input order.
    pub fn partition_calls(&self, calls: Vec<ToolCall>) -> (Vec<ToolCall>, Vec<ToolCall>) {
        calls.into_iter().partition(|c| self.is_allowed(&c.name))
    }

    /// Replace the policy in place.
    pub fn update(&mut self, permissions: ToolPermissions) {
        *self = permissions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_allows_everything() {
        assert!(ToolPermissions::default().is_allowed("any_tool"));
    }

    #[test]
    fn test_all_strategy_honours_blocked() {
        let perms = ToolPermissions {
            strategy: PermissionStrategy::All,
            allowed: vec![],
            blocked: vec!["blocked_tool".into()],
        };
        assert!(perms.is_allowed("allowed_tool"));
        assert!(!perms.is_allowed("blocked_tool"));
    }

    #[test]
    fn test_allowlist() {
        let perms = ToolPermissions::allowlist(["tool1", "tool2"]);
        assert!(perms.is_allowed("tool1"));
        assert!(perms.is_allowed("tool2"));
        assert!(!perms.is_allowed("tool3"));
    }

    #[test]
    fn test_blocklist() {
        let perms = ToolPermissions::blocklist(["rm"]);
        assert!(perms.is_allowed("ls"));
        assert!(!perms.is_allowed("rm"));
    }

    #[test]
    fn test_filter_allowed() {
        let perms = ToolPermissions::allowlist(["tool1", "tool2"]);
        let allowed = perms.filter_allowed(["tool1", "tool2", "tool3", "tool4"]);
        assert_eq!(allowed, vec!["tool1", "tool2"]);
    }

    #[test]
    fn test_partition_calls() {
        let perms = ToolPermissions::blocklist(["shell"]);
        let (ok, denied) = perms.partition_calls(vec![
            ToolCall::new("1", "read", json!({})),
            ToolCall::new("2", "shell", json!({})),
            ToolCall::new("3", "write", json!({})),
        ]);
        assert_eq!(ok.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), ["1", "3"]);
        assert_eq!(denied.len(), 1);
    }

    #[test]
    fn test_update() {
        let mut perms = ToolPermissions::allowlist(["tool1"]);
        assert!(!perms.is_allowed("tool2"));
        perms.update(ToolPermissions::allowlist(["tool1", "tool2"]));
        assert!(perms.is_allowed("tool2"));
    }

    #[test]
    fn test_serde_strategy() {
        let perms: ToolPermissions =
            serde_json::from_value(json!({"strategy": "allowlist", "allowed": ["a"]})).unwrap();
        assert_eq!(perms.strategy, PermissionStrategy::Allowlist);
        assert!(perms.blocked.is_empty());
    }
}
