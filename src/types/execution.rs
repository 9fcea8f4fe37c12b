//! Execution ledger rows and turn/workflow outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::state::ExecutionStatus;
use crate::errors::ExecutionFailure;
use crate::types::conversation::{Citation, Message, ToolCallRecord, ToolResultRecord};

/// One ledger record of a single agent invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub agent_slug: String,
    pub workflow_slug: Option<String>,
    /// Zero-based position of the step inside its workflow run
    pub step_index: Option<usize>,
    pub status: ExecutionStatus,
    pub input: String,
    pub output: Option<String>,
    pub tool_calls: Vec<ExecutedToolCall>,
    pub tokens_used: u64,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentExecution {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A tool call together with its result, as recorded on the execution row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedToolCall {
    pub call: ToolCallRecord,
    pub result: ToolResultRecord,
}

/// Parameters for opening an execution row
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecution {
    pub conversation_id: Uuid,
    pub agent_slug: String,
    pub workflow_slug: Option<String>,
    pub step_index: Option<usize>,
    pub input: String,
}

/// Terminal write applied to a running execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed {
        output: String,
        tool_calls: Vec<ExecutedToolCall>,
        tokens_used: u64,
        duration_ms: u64,
    },
    Failed {
        error_message: String,
        tool_calls: Vec<ExecutedToolCall>,
        tokens_used: u64,
        duration_ms: u64,
    },
}

impl ExecutionOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            ExecutionOutcome::Completed { .. } => ExecutionStatus::Completed,
            ExecutionOutcome::Failed { .. } => ExecutionStatus::Failed,
        }
    }

    pub fn tokens_used(&self) -> u64 {
        match self {
            ExecutionOutcome::Completed { tokens_used, .. }
            | ExecutionOutcome::Failed { tokens_used, .. } => *tokens_used,
        }
    }
}

/// Aggregate statistics over the ledger, computed at query time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub running: u64,
    /// Average over terminal executions only
    pub average_duration_ms: f64,
    pub total_tokens: u64,
}

impl ExecutionStats {
    /// Fraction of terminal executions that completed
    pub fn success_rate(&self) -> f64 {
        let terminal = self.successful + self.failed;
        if terminal == 0 {
            0.0
        } else {
            self.successful as f64 / terminal as f64
        }
    }

    /// Fold a set of executions into statistics
    pub fn from_executions<'a>(executions: impl IntoIterator<Item = &'a AgentExecution>) -> Self {
        let mut stats = ExecutionStats::default();
        let mut duration_sum = 0u64;
        let mut duration_count = 0u64;

        for execution in executions {
            stats.total += 1;
            stats.total_tokens += execution.tokens_used;
            match execution.status {
                ExecutionStatus::Completed => stats.successful += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Pending | ExecutionStatus::Running => stats.running += 1,
            }
            if execution.is_terminal() {
                if let Some(duration) = execution.duration_ms {
                    duration_sum += duration;
                    duration_count += 1;
                }
            }
        }

        if duration_count > 0 {
            stats.average_duration_ms = duration_sum as f64 / duration_count as f64;
        }
        stats
    }
}

/// Result of a successful single-agent turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub execution_id: Uuid,
    pub output: String,
    pub tokens_used: u64,
    pub tool_calls: Vec<ExecutedToolCall>,
    pub citations: Vec<Citation>,
    /// The assistant message appended for this turn
    pub message: Message,
}

/// Result of a workflow run, complete or partial
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRunResult {
    pub workflow_slug: String,
    pub conversation_id: Uuid,
    /// Output of the last completed step
    pub output: Option<String>,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub total_tokens: u64,
    /// One id per step attempted, in step order
    pub execution_ids: Vec<Uuid>,
    /// Set when a step failed and the run stopped early
    pub failure: Option<ExecutionFailure>,
}

impl WorkflowRunResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.steps_completed == self.total_steps
    }
}
