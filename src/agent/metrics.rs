//! Per-query usage metrics.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PricingConfig;

/// Snapshot of a [`MetricsTracker`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub api_calls: u64,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Mean provider latency, rounded to whole milliseconds
    pub average_latency_ms: u64,
    pub total_duration_ms: u64,
    pub errors: u64,
    /// Estimated spend; `None` when no pricing is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

impl Metrics {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Accumulates counters for one reasoning loop run.
#[derive(Debug)]
pub struct MetricsTracker {
    metrics: Metrics,
    latency_total: Duration,
    started: Instant,
    pricing: PricingConfig,
}

impl MetricsTracker {
    pub fn new(pricing: PricingConfig) -> Self {
        Self {
            metrics: Metrics::default(),
            latency_total: Duration::ZERO,
            started: Instant::now(),
            pricing,
        }
    }

    /// Record one provider call.
    pub fn record_api_call(&mut self, input_tokens: u64, output_tokens: u64, latency: Duration) {
        let m = &mut self.metrics;
        m.api_calls += 1;
        m.input_tokens += input_tokens;
        m.output_tokens += output_tokens;
        self.latency_total += latency;
        m.average_latency_ms =
            (self.latency_total.as_millis() as f64 / m.api_calls as f64).round() as u64;

        if self.pricing.is_set() {
            let cost = input_tokens as f64 / 1000.0 * self.pricing.input_cost_per_1k_tokens
                + output_tokens as f64 / 1000.0 * self.pricing.output_cost_per_1k_tokens;
            m.total_cost = Some(m.total_cost.unwrap_or(0.0) + cost);
        }

        debug!(
            input_tokens,
            output_tokens,
            latency_ms = latency.as_millis() as u64,
            "Recorded API call"
        );
    }

    pub fn record_tool_calls(&mut self, count: usize) {
        self.metrics.tool_calls += count as u64;
    }

    pub fn record_tool_error(&mut self) {
        self.metrics.tool_errors += 1;
    }

    pub fn record_error(&mut self) {
        self.metrics.errors += 1;
    }

    /// Current counters with the elapsed time filled in.
    pub fn snapshot(&self) -> Metrics {
        Metrics {
            total_duration_ms: self.started.elapsed().as_millis() as u64,
            ..self.metrics.clone()
        }
    }

    pub fn reset(&mut self) {
        self.metrics = Metrics::default();
        self.latency_total = Duration::ZERO;
        self.started = Instant::now();
    }
}
