//! Tool registry for Conductor
//!
//! This module provides the `ToolRegistry` struct for managing and looking up
//! tools by name. Names are unique: registering a second tool with an existing
//! name is an error rather than a silent replacement.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{ConductorError, Result};

use super::{Tool, ToolDefinition};

/// A registry for managing available tools.
///
/// Tools are stored behind `Arc` so the executor can hold a tool across an
/// await point without keeping the registry locked.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use conductor::tools::{ToolRegistry, EchoTool};
///
/// let mut registry = ToolRegistry::new();
/// registry.register(Arc::new(EchoTool)).unwrap();
/// assert!(registry.has("echo"));
/// assert!(registry.register(Arc::new(EchoTool)).is_err());
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConductorError::DuplicateTool`] if the name is taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ConductorError::DuplicateTool(name));
        }
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Register every tool in order, stopping at the first duplicate.
    pub fn register_all<I>(&mut self, tools: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool with the given name is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the names of all registered tools, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Remove every tool.
    pub fn clear(&mut self) {
        debug!(count = self.tools.len(), "Clearing tool registry");
        self.tools.clear();
    }

    /// Every registered tool, sorted by name.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.names()
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }

    /// Tool definitions for the completion provider, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools().iter().map(|t| t.definition()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
