//! Retry provider - decorator that adds exponential backoff and a circuit
//! breaker to any [`CompletionProvider`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use conductor::config::RetryConfig;
//! use conductor::providers::RetryProvider;
//!
//! let provider = RetryProvider::new(Arc::new(my_provider), RetryConfig::default());
//! // Use `provider` as any other CompletionProvider; retries happen automatically.
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::error::{ConductorError, Result};
use crate::session::Message;
use crate::tools::ToolDefinition;

use super::{ChatOptions, CompletionProvider};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests fail immediately until the reset timeout passes.
    Open,
    /// One probe request is allowed through.
    HalfOpen,
}

#[derive(Debug, Default)]
struct Breaker {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// A decorator that retries transient provider errors and stops calling a
/// provider that keeps failing.
pub struct RetryProvider {
    inner: Arc<dyn CompletionProvider>,
    config: RetryConfig,
    breaker: Mutex<Breaker>,
}

impl std::fmt::Debug for RetryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryProvider")
            .field("inner", &self.inner.name())
            .field("max_retries", &self.config.max_retries)
            .field("failure_threshold", &self.config.failure_threshold)
            .finish()
    }
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn CompletionProvider>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            breaker: Mutex::new(Breaker::default()),
        }
    }

    /// Current breaker state.
    pub fn circuit_state(&self) -> CircuitState {
        let breaker = self.breaker();
        match breaker.opened_at {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() >= self.reset_timeout() => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.config.reset_timeout_secs)
    }

    fn breaker(&self) -> MutexGuard<'_, Breaker> {
        self.breaker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_success(&self) {
        let mut breaker = self.breaker();
        if breaker.opened_at.is_some() {
            info!(provider = self.inner.name(), "Circuit breaker closed");
        }
        *breaker = Breaker::default();
    }

    fn record_failure(&self) {
        let mut breaker = self.breaker();
        breaker.consecutive_failures += 1;
        let half_open = breaker.opened_at.is_some();
        if half_open || breaker.consecutive_failures >= self.config.failure_threshold.max(1) {
            if !half_open {
                warn!(
                    provider = self.inner.name(),
                    failures = breaker.consecutive_failures,
                    "Circuit breaker opened"
                );
            }
            breaker.opened_at = Some(Instant::now());
        }
    }
}

/// Whether an error is transient and the request should be retried.
pub fn is_retryable(err: &ConductorError) -> bool {
    match err {
        ConductorError::ProviderTyped(pe) => pe.is_retryable(),
        ConductorError::Timeout(_) => true,
        ConductorError::Http(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

/// Backoff before retry number `attempt` (0-indexed):
/// `min(initial * multiplier^attempt, max)`.
pub fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = config.backoff_multiplier.max(1.0).powi(attempt.min(32) as i32);
    let delay = (config.initial_delay_ms as f64 * factor).min(config.max_delay_ms as f64);
    Duration::from_millis(delay as u64)
}

#[async_trait]
impl CompletionProvider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<Value> {
        if !self.config.enabled {
            return self.inner.chat(messages, tools, options).await;
        }

        if self.circuit_state() == CircuitState::Open {
            return Err(ConductorError::Provider(format!(
                "Circuit breaker open for provider '{}'",
                self.inner.name()
            )));
        }

        let mut attempt = 0;
        loop {
            match self.inner.chat(messages, tools, options).await {
                Ok(value) => {
                    self.record_success();
                    return Ok(value);
                }
                Err(err) if is_retryable(&err) && attempt < self.config.max_retries => {
                    let delay = compute_delay(attempt, &self.config);
                    attempt += 1;
                    warn!(
                        provider = self.inner.name(),
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying chat request after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.record_failure();
                    return Err(err);
                }
            }
        }
    }
}
