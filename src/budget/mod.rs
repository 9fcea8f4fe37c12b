//! Turn budget management
//! Bounds each agent turn by provider rounds and wall-clock time

pub mod manager;
pub mod types;

pub use manager::TurnBudgetTracker;
pub use types::{BudgetWarning, TurnBudget, TOOL_BUDGET_EXCEEDED};
