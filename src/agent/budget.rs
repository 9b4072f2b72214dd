//! Token and cost ceilings for one query.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::BudgetConfig;

use super::metrics::Metrics;

/// Usage against one limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetUsage {
    pub used: f64,
    pub limit: f64,
    pub percent: f64,
}

impl BudgetUsage {
    fn new(used: f64, limit: f64) -> Self {
        Self {
            used,
            limit,
            percent: used / limit * 100.0,
        }
    }
}

/// Result of [`BudgetManager::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub exceeded: bool,
    pub warning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<BudgetUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<BudgetUsage>,
}

/// Checks metrics against the configured ceilings.
#[derive(Debug, Clone)]
pub struct BudgetManager {
    config: BudgetConfig,
}

impl BudgetManager {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    fn token_usage(&self, metrics: &Metrics) -> Option<BudgetUsage> {
        self.config
            .max_tokens
            .filter(|limit| *limit > 0)
            .map(|limit| BudgetUsage::new(metrics.total_tokens() as f64, limit as f64))
    }

    fn cost_usage(&self, metrics: &Metrics) -> Option<BudgetUsage> {
        let limit = self.config.max_cost.filter(|limit| *limit > 0.0)?;
        let used = metrics.total_cost?;
        Some(BudgetUsage::new(used, limit))
    }

    /// Strictly over either limit.
    pub fn is_exceeded(&self, metrics: &Metrics) -> bool {
        [self.token_usage(metrics), self.cost_usage(metrics)]
            .into_iter()
            .flatten()
            .any(|u| u.used > u.limit)
    }

    /// At or above `warn_at_percent` of either limit.
    pub fn should_warn(&self, metrics: &Metrics) -> bool {
        if self.config.warn_at_percent <= 0.0 {
            return false;
        }
        [self.token_usage(metrics), self.cost_usage(metrics)]
            .into_iter()
            .flatten()
            .any(|u| u.percent >= self.config.warn_at_percent)
    }

    pub fn status(&self, metrics: &Metrics) -> BudgetStatus {
        BudgetStatus {
            exceeded: self.is_exceeded(metrics),
            warning: self.should_warn(metrics),
            tokens: self.token_usage(metrics),
            cost: self.cost_usage(metrics),
        }
    }

    /// Log the current status; warnings at `warn`, the rest at `info`.
    pub fn log_status(&self, metrics: &Metrics) {
        let status = self.status(metrics);
        let tokens_percent = status.tokens.map(|u| u.percent.round() as u64);
        let cost_percent = status.cost.map(|u| u.percent.round() as u64);
        if status.warning {
            warn!(?tokens_percent, ?cost_percent, "Budget nearly exhausted");
        } else if status.tokens.is_some() || status.cost.is_some() {
            info!(?tokens_percent, ?cost_percent, "Budget status");
        }
    }
}
