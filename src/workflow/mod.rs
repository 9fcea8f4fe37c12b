//! Workflow execution

pub mod engine;

pub use engine::{compose_step_input, WorkflowEngine, WorkflowRequest};
