//! Agent turn execution
//!
//! Execution status state machine, bounded turn context, progress events
//! and the executor that drives the provider/tool loop.

pub mod context;
pub mod events;
pub mod executor;
pub mod state;

pub use context::{TurnContext, FAILURE_FINISH_REASON, MAX_HISTORY_MESSAGES};
pub use events::{EventSink, TurnEvent, EVENT_CHANNEL_CAPACITY};
pub use executor::{AgentExecutor, CancelHandle, CancelToken, ExecutorConfig, TurnRequest};
pub use state::{ExecutionStatus, StatusEvent};
