//! The turn-based reasoning loop.
//!
//! Each turn calls the completion provider with the current conversation and
//! the permitted tool definitions, parses the payload, runs any requested
//! tools concurrently and appends the outcome to the conversation. The loop
//! ends when a response carries no tool calls, when `max_turns` is used up,
//! when the budget is exhausted, or on the first provider or parse failure.
//! Failures are captured in the returned [`AgentResult`], never raised.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{BudgetConfig, PricingConfig, TimeoutConfig};
use crate::error::{ConductorError, Result};
use crate::providers::{parse_response, ChatOptions, CompletionProvider, ParsedResponse};
use crate::session::{ContentBlock, ConversationStore, Message};
use crate::tools::{ToolCall, ToolExecutor, ToolPermissions, ToolResult};

use super::budget::BudgetManager;
use super::context::ContextManager;
use super::metrics::{Metrics, MetricsTracker};

/// Where the loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    /// Waiting on the provider for this turn (1-based).
    Running(usize),
    /// Tool calls of the current turn are executing.
    AwaitingTools,
    /// The provider answered without tool calls.
    Completed,
    /// `max_turns` turns ran without a final answer.
    MaxTurnsReached,
    /// Token or cost ceiling exceeded after a turn.
    BudgetExceeded,
    /// Provider, parse or timeout failure.
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopState::Running(_) | LoopState::AwaitingTools)
    }
}

/// Record of one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub turn_number: usize,
    /// Text of the assistant reply
    pub assistant_message: String,
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one `query`/`continue` call.
#[derive(Debug)]
pub struct AgentResult {
    pub final_response: String,
    pub turns: Vec<TurnResult>,
    /// Every executed tool call, across all turns
    pub tool_calls: Vec<ToolCall>,
    /// Conversation snapshot taken when the loop stopped
    pub messages: Vec<Message>,
    pub metrics: Option<Metrics>,
    /// The loop stopped before a final answer
    pub truncated: bool,
    /// Terminal state of the loop
    pub state: LoopState,
    pub error: Option<ConductorError>,
}

impl AgentResult {
    /// Completed with a final answer.
    pub fn is_success(&self) -> bool {
        self.state == LoopState::Completed
    }

    /// Stopped by a provider, parse or timeout failure.
    pub fn is_failure(&self) -> bool {
        self.state == LoopState::Failed
    }
}

/// Observers for loop events. Every method defaults to a no-op.
#[cfg_attr(test, mockall::automock)]
pub trait LoopHooks: Send + Sync {
    fn on_tool_call(&self, _call: &ToolCall) {}
    fn on_tool_result(&self, _result: &ToolResult) {}
    fn on_turn_complete(&self, _turn: &TurnResult) {}
    fn on_error(&self, _error: &ConductorError) {}
}

/// Settings for one loop run.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub max_turns: usize,
    pub chat: ChatOptions,
    pub context: ContextManager,
    pub permissions: ToolPermissions,
    pub timeouts: TimeoutConfig,
    pub budget: BudgetConfig,
    pub pricing: PricingConfig,
    pub track_metrics: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_turns: 30,
            chat: ChatOptions::default(),
            context: ContextManager::new(100_000, true),
            permissions: ToolPermissions::default(),
            timeouts: TimeoutConfig::default(),
            budget: BudgetConfig::default(),
            pricing: PricingConfig::default(),
            track_metrics: true,
        }
    }
}

enum TurnOutcome {
    Continue,
    Final(String),
}

/// One run of the reasoning loop over a borrowed conversation.
///
/// A fresh loop is built per query; the conversation outlives it.
pub struct ReasoningLoop {
    provider: Arc<dyn CompletionProvider>,
    executor: ToolExecutor,
    options: LoopOptions,
    hooks: Option<Arc<dyn LoopHooks>>,
    state: LoopState,
    metrics: MetricsTracker,
    budget: BudgetManager,
    turns: Vec<TurnResult>,
    tool_calls: Vec<ToolCall>,
}

impl ReasoningLoop {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        executor: ToolExecutor,
        options: LoopOptions,
    ) -> Self {
        let metrics = MetricsTracker::new(options.pricing.clone());
        let budget = BudgetManager::new(options.budget.clone());
        Self {
            provider,
            executor,
            options,
            hooks: None,
            state: LoopState::Running(0),
            metrics,
            budget,
            turns: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LoopHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run turns until a terminal state and return the result.
    pub async fn run(mut self, store: &mut ConversationStore) -> AgentResult {
        let max_turns = self.options.max_turns;
        let started = Instant::now();
        info!(provider = self.provider.name(), max_turns, "Starting reasoning loop");

        for turn in 1..=max_turns {
            if let Some(limit) = self.options.timeouts.total_session() {
                if started.elapsed() > limit {
                    warn!(turn, limit_ms = limit.as_millis() as u64, "Session timeout exceeded");
                    let err = ConductorError::Timeout(format!(
                        "Session exceeded {}ms",
                        limit.as_millis()
                    ));
                    return self.fail(store, err, true);
                }
            }

            self.state = LoopState::Running(turn);
            debug!(turn, max_turns, "Turn started");

            match self.turn(store, turn).await {
                Ok(TurnOutcome::Final(text)) => {
                    self.state = LoopState::Completed;
                    info!(turn, "Final response received");
                    return self.finish(store, Some(text), false, None);
                }
                Ok(TurnOutcome::Continue) => {
                    let metrics = self.metrics.snapshot();
                    if self.budget.is_exceeded(&metrics) {
                        warn!(turn, total_tokens = metrics.total_tokens(), "Budget exceeded, stopping");
                        self.state = LoopState::BudgetExceeded;
                        let err = ConductorError::BudgetExceeded(format!(
                            "stopped after turn {}",
                            turn
                        ));
                        return self.finish(store, None, true, Some(err));
                    }
                    self.budget.log_status(&metrics);
                }
                Err(e) => {
                    error!(turn, error = %e, "Turn failed");
                    return self.fail(store, e, false);
                }
            }
        }

        info!(max_turns, "Max turns reached");
        self.state = LoopState::MaxTurnsReached;
        self.finish(
            store,
            None,
            true,
            Some(ConductorError::MaxTurnsReached(max_turns)),
        )
    }

    async fn turn(&mut self, store: &mut ConversationStore, turn: usize) -> Result<TurnOutcome> {
        if self.options.context.needs_compression(store.messages()) {
            let compressed = self.options.context.compress(store.messages());
            info!(
                turn,
                before = store.len(),
                after = compressed.len(),
                "Compressing conversation history"
            );
            store.replace(compressed);
        }

        let response = self.call_provider(store).await?;

        let (allowed, denied) = self.options.permissions.partition_calls(response.tool_calls);
        for call in &denied {
            warn!(turn, tool = %call.name, id = %call.id, "Dropping tool call denied by permissions");
        }

        let mut turn_result = TurnResult {
            turn_number: turn,
            assistant_message: response.text.clone(),
            tool_calls: allowed.clone(),
            tool_results: None,
            reasoning: response.reasoning,
            timestamp: Utc::now(),
        };

        if allowed.is_empty() {
            store.add_assistant(response.text.clone());
            self.complete_turn(&turn_result);
            return Ok(TurnOutcome::Final(response.text));
        }

        self.state = LoopState::AwaitingTools;
        info!(turn, count = allowed.len(), "Executing tool calls");
        self.metrics.record_tool_calls(allowed.len());
        if let Some(hooks) = &self.hooks {
            allowed.iter().for_each(|call| hooks.on_tool_call(call));
        }

        let results = self.execute_tools(&allowed).await;
        for result in results.iter().filter(|r| r.is_error) {
            debug!(turn, id = %result.tool_call_id, error = ?result.error_message, "Tool call failed");
            self.metrics.record_tool_error();
        }
        if let Some(hooks) = &self.hooks {
            results.iter().for_each(|result| hooks.on_tool_result(result));
        }

        store.add_assistant(assistant_blocks(&response.text, &allowed));
        store.add_tool_results(&results);

        turn_result.tool_results = Some(results);
        self.tool_calls.extend(allowed);
        self.complete_turn(&turn_result);
        Ok(TurnOutcome::Continue)
    }

    async fn call_provider(&mut self, store: &ConversationStore) -> Result<ParsedResponse> {
        let definitions = {
            let registry = self.executor.registry();
            let registry = registry.read().await;
            registry
                .definitions()
                .into_iter()
                .filter(|d| self.options.permissions.is_allowed(&d.name))
                .collect::<Vec<_>>()
        };

        let start = Instant::now();
        let call = self
            .provider
            .chat(store.messages(), &definitions, &self.options.chat);
        let raw = match self.options.timeouts.api_call() {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ConductorError::Timeout(format!("API call timed out after {}ms", limit.as_millis()))
            })??,
            None => call.await?,
        };
        let latency = start.elapsed();

        let parsed = parse_response(&raw)?;

        if self.options.track_metrics {
            let (input, output) = match parsed.usage {
                Some(usage) => (usage.input_tokens, usage.output_tokens),
                None => (
                    self.options.context.estimate_tokens(store.messages()) as u64,
                    parsed.text.chars().count().div_ceil(4) as u64,
                ),
            };
            self.metrics.record_api_call(input, output, latency);
        }
        Ok(parsed)
    }

    /// Run a batch concurrently; a batch timeout turns every call into an
    /// error result.
    async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let Some(limit) = self.options.timeouts.tool_execution() else {
            return self.executor.execute_all(calls).await;
        };
        match tokio::time::timeout(limit, self.executor.execute_all(calls)).await {
            Ok(results) => results,
            Err(_) => {
                warn!(count = calls.len(), limit_ms = limit.as_millis() as u64, "Tool batch timed out");
                calls
                    .iter()
                    .map(|c| ToolResult::error(&c.id, batch_timeout_message(limit)))
                    .collect()
            }
        }
    }

    fn complete_turn(&mut self, turn: &TurnResult) {
        if let Some(hooks) = &self.hooks {
            hooks.on_turn_complete(turn);
        }
        self.turns.push(turn.clone());
    }

    fn fail(mut self, store: &ConversationStore, err: ConductorError, truncated: bool) -> AgentResult {
        self.metrics.record_error();
        if let Some(hooks) = &self.hooks {
            hooks.on_error(&err);
        }
        self.state = LoopState::Failed;
        self.finish(store, None, truncated, Some(err))
    }

    fn finish(
        self,
        store: &ConversationStore,
        final_text: Option<String>,
        truncated: bool,
        error: Option<ConductorError>,
    ) -> AgentResult {
        let final_response = final_text
            .or_else(|| self.turns.last().map(|t| t.assistant_message.clone()))
            .unwrap_or_else(|| "No response".to_string());
        let metrics = self.options.track_metrics.then(|| self.metrics.snapshot());

        AgentResult {
            final_response,
            turns: self.turns,
            tool_calls: self.tool_calls,
            messages: store.snapshot(),
            metrics,
            truncated,
            state: self.state,
            error,
        }
    }
}

fn batch_timeout_message(limit: Duration) -> String {
    format!("Tool execution timed out after {}ms", limit.as_millis())
}

/// The assistant message stored for a tool turn: its text (if any) followed
/// by one `tool_use` block per executed call.
fn assistant_blocks(text: &str, calls: &[ToolCall]) -> Vec<ContentBlock> {
    let mut blocks = Vec::with_capacity(calls.len() + 1);
    if !text.is_empty() {
        blocks.push(ContentBlock::text(text));
    }
    blocks.extend(calls.iter().map(|c| ContentBlock::ToolUse {
        id: c.id.clone(),
        name: c.name.clone(),
        input: c.input.clone(),
    }));
    blocks
}
