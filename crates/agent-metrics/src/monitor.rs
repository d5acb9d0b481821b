use std::time::Duration;

use agent_core::TokenCounter;

use crate::types::{MetricsSummary, StepMetrics, TokenUsage};

/// Token bookkeeping for one agent.
///
/// Totals only grow through [`Monitor::record`] / [`Monitor::record_step`];
/// [`Monitor::reset`] is the only way back to zero. Owned by a single agent
/// loop, so no synchronisation is involved.
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    total_input_token_count: u64,
    total_output_token_count: u64,
    steps: Vec<StepMetrics>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the engine's last-call counters to the totals.
    pub fn record<C>(&mut self, engine: &C) -> TokenUsage
    where
        C: TokenCounter + ?Sized,
    {
        let usage = TokenUsage::new(
            engine.last_input_token_count(),
            engine.last_output_token_count(),
        );
        self.total_input_token_count = self.total_input_token_count.saturating_add(usage.input_tokens);
        self.total_output_token_count = self
            .total_output_token_count
            .saturating_add(usage.output_tokens);
        usage
    }

    /// Like [`Monitor::record`], and also keeps per-step timing.
    pub fn record_step<C>(&mut self, engine: &C, iteration: usize, duration: Duration) -> StepMetrics
    where
        C: TokenCounter + ?Sized,
    {
        let usage = self.record(engine);
        let step = StepMetrics::new(iteration, duration, usage);

        log::info!(
            "Step {}: Duration {:.2}s | Input tokens: {} | Output tokens: {}",
            iteration,
            duration.as_secs_f64(),
            usage.input_tokens,
            usage.output_tokens
        );
        log::debug!(
            "Running totals: input {} | output {}",
            self.total_input_token_count,
            self.total_output_token_count
        );

        self.steps.push(step);
        step
    }

    pub fn reset(&mut self) {
        self.total_input_token_count = 0;
        self.total_output_token_count = 0;
        self.steps.clear();
    }

    pub fn total_input_token_count(&self) -> u64 {
        self.total_input_token_count
    }

    pub fn total_output_token_count(&self) -> u64 {
        self.total_output_token_count
    }

    pub fn total_usage(&self) -> TokenUsage {
        TokenUsage::new(self.total_input_token_count, self.total_output_token_count)
    }

    pub fn steps(&self) -> &[StepMetrics] {
        &self.steps
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            step_count: self.steps.len(),
            total_tokens: self.total_usage(),
            total_duration_ms: self
                .steps
                .iter()
                .fold(0u64, |total, step| total.saturating_add(step.duration_ms)),
        }
    }
}
