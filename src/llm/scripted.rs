//! Deterministic providers
//!
//! `ScriptedProvider` replays a queue of canned responses and records every
//! request it receives. `HashingEmbedder` maps text to a normalized
//! bag-of-words vector. Both drive the test suite and `--offline` runs.

use crate::errors::{AgentError, Result};
use crate::llm::{Completion, CompletionRequest, EmbeddingProvider, LlmProvider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// One scripted provider reaction
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return this completion
    Reply(Completion),

    /// Fail with a provider error carrying this message
    Fail(String),

    /// Sleep, then perform the inner step
    Delay(Duration, Box<ScriptStep>),
}

impl ScriptStep {
    pub fn delayed(delay: Duration, step: ScriptStep) -> Self {
        ScriptStep::Delay(delay, Box::new(step))
    }
}

/// LLM provider that replays a script
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: Mutex<Vec<CompletionRequest>>,
    /// Reply used once the script is exhausted
    fallback: Option<Completion>,
}

impl ScriptedProvider {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            fallback: None,
        }
    }

    /// Provider that always answers with the same text
    pub fn echo(content: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            fallback: Some(Completion::text(content, tokens_used)),
            ..Self::default()
        }
    }

    pub async fn push(&self, step: ScriptStep) {
        self.steps.lock().await.push_back(step);
    }

    /// Requests received so far, in order
    pub async fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn remaining_steps(&self) -> usize {
        self.steps.lock().await.len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.calls.lock().await.push(request);

        let next = self.steps.lock().await.pop_front();
        let mut step = match (next, &self.fallback) {
            (Some(step), _) => step,
            (None, Some(fallback)) => ScriptStep::Reply(fallback.clone()),
            (None, None) => {
                return Err(AgentError::Validation(
                    "scripted provider has no response left".to_string(),
                ))
            }
        };

        loop {
            match step {
                ScriptStep::Reply(completion) => return Ok(completion),
                ScriptStep::Fail(message) => return Err(AgentError::Provider(message)),
                ScriptStep::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Deterministic embedder: hashed bag of lowercase words, L2-normalized
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding, used by tests to build fixtures
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = (fnv1a(&word.to_lowercase()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "hashing"
    }
}

fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in text.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            tools: Vec::new(),
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_script_replayed_in_order() {
        let provider = ScriptedProvider::new(vec![
            ScriptStep::Fail("503".to_string()),
            ScriptStep::Reply(Completion::text("ok", 5)),
        ]);

        assert!(matches!(
            provider.complete(request()).await,
            Err(AgentError::Provider(_))
        ));
        assert_eq!(provider.complete(request()).await.unwrap().content, "ok");
        assert!(provider.complete(request()).await.is_err());
        assert_eq!(provider.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_echo_never_runs_out() {
        let provider = ScriptedProvider::echo("same", 1);
        for _ in 0..3 {
            assert_eq!(provider.complete(request()).await.unwrap().content, "same");
        }
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Prescrição trabalhista").await.unwrap();
        let b = embedder.embed("prescrição TRABALHISTA").await.unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_text("  ").iter().all(|v| *v == 0.0));
    }
}
