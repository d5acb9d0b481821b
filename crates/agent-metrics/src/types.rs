use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use agent_core::TokenUsage;

/// Usage and timing of one recorded engine round-trip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepMetrics {
    pub iteration: usize,
    pub duration_ms: u64,
    pub usage: TokenUsage,
}

impl StepMetrics {
    pub fn new(iteration: usize, duration: Duration, usage: TokenUsage) -> Self {
        Self {
            iteration,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            usage,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSummary {
    pub step_count: usize,
    pub total_tokens: TokenUsage,
    pub total_duration_ms: u64,
}
