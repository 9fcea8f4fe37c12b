//! Per-turn budget tracker
//! Counts provider rounds against the tool budget and enforces the turn deadline

use crate::budget::types::{BudgetWarning, TurnBudget, TOOL_BUDGET_EXCEEDED};
use crate::errors::{AgentError, Result};
use std::time::{Duration, Instant};

/// Tracks the rounds and wall-clock time consumed by one turn
#[derive(Debug, Clone)]
pub struct TurnBudgetTracker {
    /// Budget configuration
    budget: TurnBudget,

    /// Provider rounds started so far
    used_rounds: usize,

    /// Turn start time
    start_time: Instant,

    /// Last warning issued
    last_warning: Option<BudgetWarning>,
}

impl TurnBudgetTracker {
    /// Create a tracker with the default budget
    pub fn new() -> Self {
        Self::with_budget(TurnBudget::default())
    }

    /// Create a tracker; the clock starts now
    pub fn with_budget(budget: TurnBudget) -> Self {
        Self {
            budget,
            used_rounds: 0,
            start_time: Instant::now(),
            last_warning: None,
        }
    }

    /// Reserve the next provider round
    ///
    /// Fails with `BudgetExceeded` once all rounds are used, and with
    /// `Timeout` once the deadline has passed. Returns the 1-based round.
    pub fn begin_round(&mut self) -> Result<usize> {
        if self.is_exhausted() {
            return Err(AgentError::BudgetExceeded(TOOL_BUDGET_EXCEEDED.to_string()));
        }
        self.check_deadline()?;
        self.used_rounds += 1;
        Ok(self.used_rounds)
    }

    /// Remaining wall-clock time, or `Timeout` if the deadline has passed
    pub fn check_deadline(&self) -> Result<Duration> {
        let remaining = self.remaining_time();
        if remaining.is_zero() {
            Err(self.timeout_error())
        } else {
            Ok(remaining)
        }
    }

    /// The timeout error reported when the turn deadline is hit
    pub fn timeout_error(&self) -> AgentError {
        AgentError::Timeout {
            duration_ms: self.budget.time_budget.as_millis() as u64,
        }
    }

    pub fn remaining_time(&self) -> Duration {
        self.budget.time_budget.saturating_sub(self.start_time.elapsed())
    }

    pub fn remaining_rounds(&self) -> usize {
        self.budget.max_tool_iterations.saturating_sub(self.used_rounds)
    }

    pub fn used_rounds(&self) -> usize {
        self.used_rounds
    }

    pub fn allocated_rounds(&self) -> usize {
        self.budget.max_tool_iterations
    }

    /// No rounds left; a tool request now would exceed the budget
    pub fn is_exhausted(&self) -> bool {
        self.used_rounds >= self.budget.max_tool_iterations
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.budget.max_tool_iterations == 0 {
            return 1.0;
        }
        self.used_rounds as f64 / self.budget.max_tool_iterations as f64
    }

    /// Check for budget warnings, emitting each distinct warning once
    pub fn check_warning(&mut self) -> Option<BudgetWarning> {
        let warning = if self.is_exhausted() {
            Some(BudgetWarning::Exhausted {
                used: self.used_rounds,
                allocated: self.budget.max_tool_iterations,
            })
        } else if self.utilization() * 100.0 >= self.budget.warning_threshold as f64 {
            Some(BudgetWarning::ApproachingLimit {
                used: self.used_rounds,
                allocated: self.budget.max_tool_iterations,
                remaining: self.remaining_rounds(),
            })
        } else {
            let remaining = self.remaining_time();
            if remaining < self.budget.time_budget / 10 {
                Some(BudgetWarning::DeadlineNear { remaining })
            } else {
                None
            }
        };

        match warning {
            Some(w) if self.last_warning.as_ref().map(std::mem::discriminant)
                != Some(std::mem::discriminant(&w)) =>
            {
                self.last_warning = Some(w.clone());
                Some(w)
            }
            _ => None,
        }
    }
}

impl Default for TurnBudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}
