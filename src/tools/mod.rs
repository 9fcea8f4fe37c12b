//! Tool dispatch system
//!
//! Provides validated, concurrent tool execution with:
//! - Registry mapping tool slugs to capabilities and compiled schemas
//! - Invoker enforcing activity, agent permission, auth and schema checks
//! - Built-in legal tools (knowledge search, clients, deadlines, documents)

pub mod implementations;
pub mod invoker;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use implementations::{register_builtin_tools, BuiltinTools};
pub use invoker::ToolInvoker;
pub use registry::{RegisteredTool, ToolRegistry};
pub use types::{CallerIdentity, ToolCapability, ToolOutput, ToolResult, ToolStats, CALLER_PARAM};
