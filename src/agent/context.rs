//! Bounded turn context
//!
//! Holds the provider messages of one agent turn:
//! - System section: the agent prompt plus any retrieved context
//! - History: prior transcript, bounded with FIFO eviction
//! - Turn: the input and every tool round of the current turn, never evicted

use crate::llm::ChatMessage;
use crate::rag::context::estimate_tokens;
use crate::types::{Message, Role};
use std::collections::VecDeque;

/// Default number of prior messages replayed to the provider
pub const MAX_HISTORY_MESSAGES: usize = 40;

/// Finish reason marking system notes the executor writes for failed turns
pub const FAILURE_FINISH_REASON: &str = "error";

#[derive(Debug, Clone)]
pub struct TurnContext {
    system: Vec<ChatMessage>,
    history: VecDeque<ChatMessage>,
    max_history: usize,
    turn: Vec<ChatMessage>,
}

impl TurnContext {
    pub fn new(system_prompt: &str) -> Self {
        Self::with_history_limit(system_prompt, MAX_HISTORY_MESSAGES)
    }

    pub fn with_history_limit(system_prompt: &str, max_history: usize) -> Self {
        Self {
            system: vec![ChatMessage::system(system_prompt)],
            history: VecDeque::with_capacity(max_history.min(MAX_HISTORY_MESSAGES)),
            max_history,
            turn: Vec::new(),
        }
    }

    /// Additional system message, placed after the agent prompt
    pub fn add_system(&mut self, content: impl Into<String>) {
        self.system.push(ChatMessage::system(content));
    }

    /// Add one stored message to the history, evicting the oldest at capacity.
    /// Failure notes are skipped.
    pub fn push_history(&mut self, message: &Message) {
        if self.max_history == 0 {
            return;
        }
        let chat = match message.role {
            Role::User => ChatMessage::user(&message.content),
            Role::Assistant => ChatMessage::assistant(&message.content),
            Role::System => {
                if message.finish_reason.as_deref() == Some(FAILURE_FINISH_REASON) {
                    return;
                }
                ChatMessage::system(&message.content)
            }
        };
        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(chat);
    }

    pub fn load_history(&mut self, messages: &[Message]) {
        for message in messages {
            self.push_history(message);
        }
    }

    /// Append a message of the current turn
    pub fn push(&mut self, message: ChatMessage) {
        self.turn.push(message);
    }

    /// Full message list in provider order
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.system
            .iter()
            .chain(self.history.iter())
            .chain(self.turn.iter())
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn len(&self) -> usize {
        self.system.len() + self.history.len() + self.turn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rough prompt size
    pub fn estimated_tokens(&self) -> usize {
        self.system
            .iter()
            .chain(self.history.iter())
            .chain(self.turn.iter())
            .map(|m| estimate_tokens(&m.content))
            .sum()
    }
}
