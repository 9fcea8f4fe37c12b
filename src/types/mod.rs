//! Type definitions module
//!
//! Domain entities shared by the executor, workflow engine, retriever
//! and persistence layers.

pub mod conversation;
pub mod entities;
pub mod execution;
pub mod knowledge;

// Re-export commonly used types
pub use conversation::{
    Citation, Conversation, ConversationMode, Message, NewCitation, NewConversation, NewMessage,
    Role, ToolCallRecord, ToolResultRecord,
};
pub use entities::{Agent, AgentSettings, StepConfig, Tool, Workflow, CAPABILITY_RAG};
pub use execution::{
    AgentExecution, ExecutedToolCall, ExecutionOutcome, ExecutionStats, NewExecution,
    TurnOutcome, WorkflowRunResult,
};
pub use knowledge::{KnowledgeEntry, NewKnowledgeEntry, ScoredEntry, SearchFilter};
