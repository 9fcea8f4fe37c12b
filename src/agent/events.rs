//! Turn progress events
//!
//! Executors publish [`TurnEvent`]s through an [`EventSink`] backed by a
//! bounded channel. Publishing never blocks the turn: when the receiver is
//! slow or gone, events are dropped.

use crate::errors::ErrorKind;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default channel capacity
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    ExecutionStarted {
        execution_id: Uuid,
        agent_slug: String,
        step_index: Option<usize>,
    },
    RetrievalFinished {
        sources: usize,
    },
    ProviderRound {
        round: usize,
        max_rounds: usize,
    },
    ToolCallStarted {
        call_id: String,
        tool_slug: String,
    },
    ToolCallFinished {
        call_id: String,
        tool_slug: String,
        success: bool,
        duration_ms: u64,
    },
    Completed {
        execution_id: Uuid,
        output: String,
        tokens_used: u64,
    },
    Failed {
        execution_id: Uuid,
        kind: ErrorKind,
        message: String,
    },
}

impl TurnEvent {
    /// Last event of a turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Completed { .. } | TurnEvent::Failed { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::Sender<TurnEvent>>,
}

impl EventSink {
    /// Sink plus the receiving end of a bounded channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TurnEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender: Some(sender) }, receiver)
    }

    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: TurnEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (sink, mut receiver) = EventSink::channel(EVENT_CHANNEL_CAPACITY);
        sink.emit(TurnEvent::ProviderRound { round: 1, max_rounds: 3 });
        sink.emit(TurnEvent::RetrievalFinished { sources: 2 });

        assert_eq!(
            receiver.recv().await,
            Some(TurnEvent::ProviderRound { round: 1, max_rounds: 3 })
        );
        assert_eq!(
            receiver.recv().await,
            Some(TurnEvent::RetrievalFinished { sources: 2 })
        );
    }

    #[tokio::test]
    async fn test_full_channel_drops_events() {
        let (sink, mut receiver) = EventSink::channel(1);
        sink.emit(TurnEvent::RetrievalFinished { sources: 1 });
        sink.emit(TurnEvent::RetrievalFinished { sources: 2 });
        drop(sink);

        assert_eq!(
            receiver.recv().await,
            Some(TurnEvent::RetrievalFinished { sources: 1 })
        );
        assert_eq!(receiver.recv().await, None);
    }

    #[test]
    fn test_disabled_sink_is_noop() {
        EventSink::disabled().emit(TurnEvent::RetrievalFinished { sources: 0 });
        assert!(TurnEvent::Failed {
            execution_id: Uuid::nil(),
            kind: ErrorKind::Timeout,
            message: String::new(),
        }
        .is_terminal());
    }
}
