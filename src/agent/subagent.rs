//! Named sub-agents derived from a parent [`Agent`], with parallel and
//! dependency-ordered task execution.
//!
//! Sub-agents share the parent's provider handle and settings but own their
//! conversation and tool registry. Context moves between agents by copy,
//! through [`sharing::share`](super::sharing::share).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::{McpConfig, SwarmConfig};
use crate::error::{ConductorError, Result};
use crate::tools::Tool;

use super::instance::{Agent, AgentOptions};
use super::r#loop::AgentResult;
use super::sharing::{share, ShareOptions};

/// Messages replayed by [`SubAgentManager::share_context`].
const SHARED_MESSAGES: usize = 5;

/// Overrides applied when deriving a sub-agent from the parent.
#[derive(Clone, Default)]
pub struct SubAgentOptions {
    pub name: String,
    pub system_prompt: Option<String>,
    pub max_turns: Option<usize>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Tools registered on the new agent
    pub tools: Vec<Arc<dyn Tool>>,
    /// Seed the conversation from the parent's recent messages
    pub inherit_context: bool,
}

impl SubAgentOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherit_context: true,
            ..Self::default()
        }
    }
}

/// A unit of work for [`SubAgentManager::execute_parallel`] and
/// [`SubAgentManager::coordinate_agents`]. `name` also names the sub-agent
/// that runs it.
#[derive(Clone, Default)]
pub struct Task {
    pub name: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub tools: Vec<Arc<dyn Tool>>,
    /// Names of tasks that must finish first
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn depends_on<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of one task.
#[derive(Debug)]
pub struct TaskResult {
    pub task: String,
    pub result: AgentResult,
}

/// Owns a set of named sub-agents derived from one parent.
pub struct SubAgentManager {
    parent: Arc<Mutex<Agent>>,
    agents: HashMap<String, Arc<Mutex<Agent>>>,
    limit: Arc<Semaphore>,
    inherit_messages: usize,
}

impl SubAgentManager {
    pub fn new(parent: Arc<Mutex<Agent>>) -> Self {
        Self::with_config(parent, &SwarmConfig::default())
    }

    pub fn with_config(parent: Arc<Mutex<Agent>>, config: &SwarmConfig) -> Self {
        Self {
            parent,
            agents: HashMap::new(),
            limit: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            inherit_messages: config.inherit_messages,
        }
    }

    pub fn parent(&self) -> Arc<Mutex<Agent>> {
        Arc::clone(&self.parent)
    }

    /// Create a sub-agent, or return the existing one with that name.
    pub async fn create_sub_agent(&mut self, options: SubAgentOptions) -> Result<Arc<Mutex<Agent>>> {
        if let Some(existing) = self.agents.get(&options.name) {
            return Ok(Arc::clone(existing));
        }

        let (child_options, provider, inherited) = {
            let parent = self.parent.lock().await;
            let base = parent.internal_config();
            let child_options = AgentOptions {
                system_prompt: options
                    .system_prompt
                    .clone()
                    .or_else(|| base.system_prompt.clone()),
                max_turns: options.max_turns.unwrap_or(base.max_turns),
                max_tokens: options.max_tokens.unwrap_or(base.max_tokens),
                temperature: options.temperature.unwrap_or(base.temperature),
                mcp: McpConfig::default(),
                session_id: None,
                ..base.clone()
            };
            let inherited = options.inherit_context.then(|| parent.messages());
            (child_options, parent.provider_handle(), inherited)
        };

        let mut child = Agent::new(child_options, provider)?;
        child.register_tools(options.tools.clone()).await?;

        if let Some(messages) = inherited {
            let share_options = ShareOptions {
                include_system: false,
                max_messages: self.inherit_messages,
                filter_by_role: None,
            };
            share(&messages, child.store_mut(), &share_options);
        }

        info!(
            agent = %options.name,
            inherited = options.inherit_context,
            tools = options.tools.len(),
            "Created sub-agent"
        );
        let child = Arc::new(Mutex::new(child));
        self.agents.insert(options.name, Arc::clone(&child));
        Ok(child)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mutex<Agent>>> {
        self.agents.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Mutex<Agent>>> {
        self.agents.remove(name)
    }

    /// Sub-agent names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run every task on its named sub-agent concurrently.
    ///
    /// Fail-fast: the first task whose loop ends in a failed state fails the
    /// whole batch with [`ConductorError::TaskFailed`] and the other queries
    /// are dropped. Results come back in task order.
    pub async fn execute_parallel(&mut self, tasks: &[Task]) -> Result<Vec<TaskResult>> {
        let mut runs = Vec::with_capacity(tasks.len());
        for task in tasks {
            let agent = self
                .create_sub_agent(SubAgentOptions {
                    system_prompt: task.system_prompt.clone(),
                    tools: task.tools.clone(),
                    ..SubAgentOptions::new(&task.name)
                })
                .await?;
            runs.push((task, agent));
        }

        debug!(tasks = runs.len(), "Executing tasks in parallel");
        let limit = &self.limit;
        try_join_all(runs.into_iter().map(|(task, agent)| async move {
            let _permit = match limit.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    return Err(ConductorError::Session(format!(
                        "Task scheduler closed: {}",
                        e
                    )))
                }
            };
            let result = agent.lock().await.query(&task.prompt).await;
            if result.is_failure() {
                let message = result
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown failure".to_string());
                warn!(task = %task.name, error = %message, "Task failed");
                return Err(ConductorError::TaskFailed {
                    task: task.name.clone(),
                    message,
                });
            }
            Ok(TaskResult {
                task: task.name.clone(),
                result,
            })
        }))
        .await
    }

    /// Run tasks in dependency order, each wave of ready tasks in parallel.
    ///
    /// The schedule is planned before anything runs: duplicate names fail
    /// with [`ConductorError::InvalidTask`], and a cycle or a dependency on
    /// an unknown task fails with [`ConductorError::DependencyCycle`].
    /// Results come back in execution order.
    pub async fn coordinate_agents(&mut self, tasks: &[Task]) -> Result<Vec<TaskResult>> {
        let waves = plan_waves(tasks)?;
        let mut results = Vec::with_capacity(tasks.len());
        for (index, wave) in waves.into_iter().enumerate() {
            let names: Vec<&str> = wave.iter().map(|t| t.name.as_str()).collect();
            info!(wave = index + 1, tasks = ?names, "Running task wave");
            let batch: Vec<Task> = wave.into_iter().cloned().collect();
            results.extend(self.execute_parallel(&batch).await?);
        }
        Ok(results)
    }

    /// Replay the last five non-system messages of `from` into `to`.
    pub async fn share_context(&self, from: &str, to: &str) -> Result<usize> {
        let source = self
            .get(from)
            .ok_or_else(|| ConductorError::NotFound(format!("sub-agent '{}'", from)))?;
        let target = self
            .get(to)
            .ok_or_else(|| ConductorError::NotFound(format!("sub-agent '{}'", to)))?;

        let messages = source.lock().await.messages();
        let options = ShareOptions {
            include_system: false,
            max_messages: SHARED_MESSAGES,
            filter_by_role: None,
        };
        let count = share(&messages, target.lock().await.store_mut(), &options);
        debug!(from, to, count, "Shared context");
        Ok(count)
    }
}

/// Group tasks into waves whose dependencies are all in earlier waves.
fn plan_waves(tasks: &[Task]) -> Result<Vec<Vec<&Task>>> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.name.as_str()) {
            return Err(ConductorError::InvalidTask(format!(
                "duplicate task name '{}'",
                task.name
            )));
        }
    }

    let mut done: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&Task> = tasks.iter().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&Task>, Vec<&Task>) = remaining
            .into_iter()
            .partition(|t| t.depends_on.iter().all(|d| done.contains(d.as_str())));
        if ready.is_empty() {
            let mut names: Vec<String> = blocked.iter().map(|t| t.name.clone()).collect();
            names.sort();
            return Err(ConductorError::DependencyCycle(names));
        }
        done.extend(ready.iter().map(|t| t.name.as_str()));
        waves.push(ready);
        remaining = blocked;
    }
    Ok(waves)
}
