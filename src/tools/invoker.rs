//! Tool invoker with validation and bounded concurrency
//!
//! Every call goes through the same gate before dispatch:
//! 1. the slug is registered and the tool is active (not found)
//! 2. the tool is allowed for the invoking agent (permission)
//! 3. an authenticated caller is present when the tool requires auth (permission)
//! 4. the parameters satisfy the declared schema (validation)
//!
//! Failures are returned as `ToolResult { success: false, .. }`, never
//! thrown, so the model can read the error and correct itself.

use crate::errors::{AgentError, Result};
use crate::tools::registry::ToolRegistry;
use crate::tools::types::{CallerIdentity, ToolResult, ToolStats, CALLER_PARAM};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default maximum concurrent tool calls
pub const MAX_PARALLEL_CALLS: usize = 4;

/// Default per-call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatches tool calls through the registry
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    /// Tool registry
    registry: Arc<ToolRegistry>,

    /// Semaphore for concurrency control
    semaphore: Arc<Semaphore>,

    /// Timeout applied to each capability call
    call_timeout: Duration,

    /// Per-tool statistics
    stats: Arc<DashMap<String, ToolStats>>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_config(registry, MAX_PARALLEL_CALLS, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_config(registry: Arc<ToolRegistry>, max_parallel: usize, call_timeout: Duration) -> Self {
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
            call_timeout,
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Invoke one tool; never fails, errors are carried in the result
    pub async fn invoke(
        &self,
        tool_slug: &str,
        parameters: serde_json::Value,
        caller: &CallerIdentity,
    ) -> ToolResult {
        let start = Instant::now();

        let result = match self.dispatch(tool_slug, parameters, caller).await {
            Ok(output) => ToolResult::success(tool_slug, output, start.elapsed()),
            Err(e) => {
                warn!(tool = tool_slug, agent = %caller.agent_slug, error = %e, "tool call failed");
                ToolResult::failure(tool_slug, &e, start.elapsed())
            }
        };

        debug!(
            tool = tool_slug,
            success = result.success,
            duration_ms = result.duration_ms,
            "tool call finished"
        );
        self.stats
            .entry(tool_slug.to_string())
            .or_default()
            .record(&result);
        result
    }

    /// Invoke independent calls concurrently; results keep the input order
    pub async fn invoke_all(
        &self,
        calls: Vec<(String, serde_json::Value)>,
        caller: &CallerIdentity,
    ) -> Vec<ToolResult> {
        join_all(
            calls
                .into_iter()
                .map(|(slug, params)| async move { self.invoke(&slug, params, caller).await }),
        )
        .await
    }

    async fn dispatch(
        &self,
        tool_slug: &str,
        parameters: serde_json::Value,
        caller: &CallerIdentity,
    ) -> Result<crate::tools::types::ToolOutput> {
        let registered = self
            .registry
            .get(tool_slug)
            .filter(|t| t.tool.is_active)
            .ok_or_else(|| AgentError::not_found("Tool", tool_slug))?;

        if !registered.tool.is_allowed_for(&caller.agent_slug) {
            return Err(AgentError::Permission(format!(
                "tool '{}' is not allowed for agent '{}'",
                tool_slug, caller.agent_slug
            )));
        }

        if registered.tool.requires_auth && caller.user_id.is_none() {
            return Err(AgentError::Permission(format!(
                "tool '{}' requires an authenticated caller",
                tool_slug
            )));
        }

        registered.validate(&parameters)?;

        let mut parameters = match parameters {
            serde_json::Value::Object(map) => map,
            _ => {
                return Err(AgentError::Validation(format!(
                    "parameters for '{}' must be an object",
                    tool_slug
                )))
            }
        };
        parameters.insert(CALLER_PARAM.to_string(), serde_json::to_value(caller)?);

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| AgentError::Generic(format!("tool semaphore closed: {}", e)))?;

        let capability = registered.capability.clone();
        match tokio::time::timeout(
            self.call_timeout,
            capability.execute(serde_json::Value::Object(parameters)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout {
                duration_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }

    /// Snapshot of the statistics for one tool
    pub fn stats(&self, tool_slug: &str) -> ToolStats {
        self.stats
            .get(tool_slug)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}
