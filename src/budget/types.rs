//! Budget system type definitions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message recorded when the tool-call budget runs out
pub const TOOL_BUDGET_EXCEEDED: &str = "tool call budget exceeded";

/// Limits applied to a single agent turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnBudget {
    /// Maximum number of provider rounds (default: 5)
    pub max_tool_iterations: usize,

    /// Wall-clock budget for the whole turn (default: 120s)
    #[serde(with = "duration_secs")]
    pub time_budget: Duration,

    /// Warning threshold in percent of the round budget (default: 80)
    #[serde(skip, default = "default_warning_threshold")]
    pub warning_threshold: u8,
}

impl Default for TurnBudget {
    fn default() -> Self {
        Self {
            max_tool_iterations: 5,
            time_budget: Duration::from_secs(120),
            warning_threshold: default_warning_threshold(),
        }
    }
}

impl TurnBudget {
    pub fn new(max_tool_iterations: usize, time_budget: Duration) -> Self {
        Self {
            max_tool_iterations,
            time_budget,
            ..Default::default()
        }
    }
}

/// Budget warning types
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetWarning {
    /// Approaching the round limit
    ApproachingLimit {
        used: usize,
        allocated: usize,
        remaining: usize,
    },

    /// Rounds exhausted
    Exhausted { used: usize, allocated: usize },

    /// Less than a tenth of the time budget remains
    DeadlineNear { remaining: Duration },
}

fn default_warning_threshold() -> u8 {
    80
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
