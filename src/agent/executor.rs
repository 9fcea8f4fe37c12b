//! Agent executor
//!
//! Runs one agent turn:
//! 1. Open a `running` ledger row
//! 2. Optionally retrieve context for RAG-capable agents
//! 3. Loop: query the provider, run requested tools concurrently, feed the
//!    results back, until a response requests no tools
//! 4. Close the row and append the outcome to the conversation
//!
//! The loop is bounded by the turn budget (provider rounds and wall-clock
//! time). Every failure after the row exists closes it as `failed` and is
//! returned as [`AgentError::ExecutionFailed`].

use crate::agent::context::{TurnContext, FAILURE_FINISH_REASON, MAX_HISTORY_MESSAGES};
use crate::agent::events::{EventSink, TurnEvent};
use crate::budget::{TurnBudget, TurnBudgetTracker, TOOL_BUDGET_EXCEEDED};
use crate::errors::{AgentError, ExecutionFailure, Result};
use crate::llm::{
    ChatMessage, Completion, CompletionRequest, LlmProvider, RetryPolicy, ToolDefinition,
};
use crate::rag::RagRetriever;
use crate::store::{ConversationStore, ExecutionLedger};
use crate::tools::{CallerIdentity, ToolInvoker, ToolResult};
use crate::types::{
    Agent, ExecutedToolCall, ExecutionOutcome, NewCitation, NewExecution, NewMessage,
    SearchFilter, ToolCallRecord, ToolResultRecord, TurnOutcome, CAPABILITY_RAG,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default timeout of a single provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Executor-wide defaults; agent settings and request overrides take precedence
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub budget: TurnBudget,
    pub provider_call_timeout: Duration,
    pub max_history_messages: usize,
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            budget: TurnBudget::default(),
            provider_call_timeout: DEFAULT_PROVIDER_TIMEOUT,
            max_history_messages: MAX_HISTORY_MESSAGES,
            retry: RetryPolicy::new(),
        }
    }
}

/// One turn to execute
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub conversation_id: Uuid,
    pub user_id: Option<String>,
    pub input: String,
    pub workflow_slug: Option<String>,
    pub step_index: Option<usize>,
    /// Store the input as a user message before running
    pub persist_input: bool,
    /// Replay the conversation transcript to the provider
    pub include_history: bool,
    pub max_tool_iterations: Option<usize>,
    pub time_budget: Option<Duration>,
}

impl TurnRequest {
    /// A chat turn: input persisted, history replayed
    pub fn chat(conversation_id: Uuid, user_id: Option<String>, input: impl Into<String>) -> Self {
        Self {
            conversation_id,
            user_id,
            input: input.into(),
            workflow_slug: None,
            step_index: None,
            persist_input: true,
            include_history: true,
            max_tool_iterations: None,
            time_budget: None,
        }
    }

    /// A workflow step: the input already carries the accumulated context
    pub fn workflow_step(
        conversation_id: Uuid,
        user_id: Option<String>,
        workflow_slug: impl Into<String>,
        step_index: usize,
        input: impl Into<String>,
    ) -> Self {
        Self {
            workflow_slug: Some(workflow_slug.into()),
            step_index: Some(step_index),
            persist_input: false,
            include_history: false,
            ..Self::chat(conversation_id, user_id, input)
        }
    }

    pub fn with_max_tool_iterations(mut self, max: Option<usize>) -> Self {
        self.max_tool_iterations = max;
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }
}

/// Caller side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

/// Turn side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn pair() -> (Self, CancelToken) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                sender: Arc::new(sender),
            },
            CancelToken { receiver },
        )
    }

    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

impl CancelToken {
    /// Token that is never cancelled
    pub fn never() -> Self {
        CancelHandle::pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is dropped first
    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Closes the row as failed if the turn future is dropped mid-flight
struct ExecutionGuard {
    ledger: Arc<dyn ExecutionLedger>,
    execution_id: Uuid,
    started: Instant,
    armed: bool,
}

impl ExecutionGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let ledger = self.ledger.clone();
        let execution_id = self.execution_id;
        let outcome = ExecutionOutcome::Failed {
            error_message: AgentError::Cancelled("turn dropped before completion".to_string())
                .to_string(),
            tool_calls: Vec::new(),
            tokens_used: 0,
            duration_ms: self.started.elapsed().as_millis() as u64,
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = ledger.complete(execution_id, outcome).await {
                        error!(%execution_id, error = %e, "failed to close dropped execution");
                    }
                });
            }
            Err(_) => error!(%execution_id, "execution dropped outside a runtime; row left running"),
        }
    }
}

/// State accumulated while a turn runs
#[derive(Debug, Default)]
struct TurnProgress {
    tokens_used: u64,
    /// Tokens already charged to the conversation by the assistant message
    charged: bool,
    tool_calls: Vec<ExecutedToolCall>,
    citations: Vec<NewCitation>,
}

impl TurnProgress {
    fn record(&mut self, call: ToolCallRecord, result: ToolResult) {
        if result.success {
            self.citations.extend(result.citations.iter().cloned());
        }
        let record = ToolResultRecord {
            call_id: call.id.clone(),
            tool_slug: call.tool_slug.clone(),
            success: result.success,
            result: result.result,
            error: result.error,
            duration_ms: result.duration_ms,
        };
        self.tool_calls.push(ExecutedToolCall { call, result: record });
    }

    /// Citations in first-seen order without duplicates
    fn unique_citations(&self) -> Vec<NewCitation> {
        let mut seen = HashSet::new();
        self.citations
            .iter()
            .filter(|c| seen.insert(c.dedup_key()))
            .cloned()
            .collect()
    }
}

/// Runs agent turns against a provider, tools, retriever and stores
#[derive(Clone)]
pub struct AgentExecutor {
    provider: Arc<dyn LlmProvider>,
    invoker: ToolInvoker,
    retriever: Option<RagRetriever>,
    conversations: Arc<dyn ConversationStore>,
    ledger: Arc<dyn ExecutionLedger>,
    config: ExecutorConfig,
}

impl AgentExecutor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        invoker: ToolInvoker,
        conversations: Arc<dyn ConversationStore>,
        ledger: Arc<dyn ExecutionLedger>,
    ) -> Self {
        Self {
            provider,
            invoker,
            retriever: None,
            conversations,
            ledger,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_retriever(mut self, retriever: RagRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    pub fn ledger(&self) -> &Arc<dyn ExecutionLedger> {
        &self.ledger
    }

    /// Request override, then agent setting, then executor default
    fn budget_for(&self, agent: &Agent, request: &TurnRequest) -> TurnBudget {
        let mut budget = self.config.budget;
        if let Some(max) = request.max_tool_iterations.or(agent.config.max_tool_iterations) {
            budget.max_tool_iterations = max;
        }
        if let Some(time) = request
            .time_budget
            .or_else(|| agent.config.turn_timeout_secs.map(Duration::from_secs))
        {
            budget.time_budget = time;
        }
        budget
    }

    /// Run a turn without events or cancellation
    pub async fn run_turn(&self, agent: &Agent, request: TurnRequest) -> Result<TurnOutcome> {
        self.run(agent, request, &EventSink::disabled(), CancelToken::never())
            .await
    }

    /// Run one turn of `agent`
    pub async fn run(
        &self,
        agent: &Agent,
        request: TurnRequest,
        events: &EventSink,
        mut cancel: CancelToken,
    ) -> Result<TurnOutcome> {
        if !agent.is_active {
            return Err(AgentError::not_found("Agent", &agent.slug));
        }
        if request.input.trim().is_empty() {
            return Err(AgentError::Validation("turn input is empty".to_string()));
        }
        let conversation = self.conversations.get(request.conversation_id).await?;
        if !conversation.is_active {
            return Err(AgentError::not_found(
                "Conversation",
                request.conversation_id.to_string(),
            ));
        }

        let mut context =
            TurnContext::with_history_limit(&agent.system_prompt, self.config.max_history_messages);
        if request.include_history {
            let history = self
                .conversations
                .list_messages(request.conversation_id)
                .await?;
            context.load_history(&history);
        }
        if request.persist_input {
            self.conversations
                .append_message(request.conversation_id, NewMessage::user(&request.input))
                .await?;
        }

        let execution = self
            .ledger
            .start(NewExecution {
                conversation_id: request.conversation_id,
                agent_slug: agent.slug.clone(),
                workflow_slug: request.workflow_slug.clone(),
                step_index: request.step_index,
                input: request.input.clone(),
            })
            .await?;
        let started = Instant::now();
        let mut guard = ExecutionGuard {
            ledger: self.ledger.clone(),
            execution_id: execution.id,
            started,
            armed: true,
        };

        let budget = self.budget_for(agent, &request);
        info!(
            execution_id = %execution.id,
            agent = %agent.slug,
            workflow = request.workflow_slug.as_deref().unwrap_or("-"),
            max_rounds = budget.max_tool_iterations,
            time_budget_ms = budget.time_budget.as_millis() as u64,
            "agent turn started"
        );
        events.emit(TurnEvent::ExecutionStarted {
            execution_id: execution.id,
            agent_slug: agent.slug.clone(),
            step_index: request.step_index,
        });

        let mut progress = TurnProgress::default();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(AgentError::Cancelled("turn cancelled by caller".to_string()))
            }
            result = self.drive(agent, &request, budget, context, &mut progress, events) => result,
        };

        let outcome = match result {
            Ok(completion) => {
                self.finish_success(agent, &request, execution.id, started, completion, &mut progress, events)
                    .await
            }
            Err(e) => Err(e),
        };
        let outcome = match outcome {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self
                .finish_failure(agent, &request, execution.id, started, e, &progress, events)
                .await),
        };
        guard.disarm();
        outcome
    }

    /// The provider/tool loop; returns the final completion
    async fn drive(
        &self,
        agent: &Agent,
        request: &TurnRequest,
        budget: TurnBudget,
        mut context: TurnContext,
        progress: &mut TurnProgress,
        events: &EventSink,
    ) -> Result<Completion> {
        let mut tracker = TurnBudgetTracker::with_budget(budget);

        if agent.has_capability(CAPABILITY_RAG) {
            if let Some(retriever) = &self.retriever {
                let top_k = agent
                    .config
                    .retrieval_top_k
                    .unwrap_or(retriever.config().top_k);
                let remaining = tracker.check_deadline()?;
                let retrieved = tokio::time::timeout(
                    remaining,
                    retriever.retrieve(&request.input, &SearchFilter::default(), top_k),
                )
                .await
                .map_err(|_| tracker.timeout_error())??;

                events.emit(TurnEvent::RetrievalFinished {
                    sources: retrieved.sources.len(),
                });
                if !retrieved.is_empty() {
                    context.add_system(format!(
                        "Relevant sources from the knowledge base:\n\n{}",
                        retrieved.context_summary
                    ));
                    progress.citations.extend(retrieved.citations());
                }
            }
        }

        context.push(ChatMessage::user(&request.input));
        let tools = self.invoker.registry().definitions_for(agent);
        let caller = CallerIdentity::new(request.user_id.clone(), &agent.slug)
            .with_conversation(request.conversation_id);

        loop {
            let round = tracker.begin_round()?;
            events.emit(TurnEvent::ProviderRound {
                round,
                max_rounds: tracker.allocated_rounds(),
            });
            if let Some(warning) = tracker.check_warning() {
                debug!(agent = %agent.slug, ?warning, "turn budget warning");
            }

            let completion = self.complete(agent, &context, &tools, &tracker).await?;
            progress.tokens_used += completion.tokens_used;
            debug!(
                agent = %agent.slug,
                round,
                tokens = completion.tokens_used,
                tool_calls = completion.tool_calls.len(),
                "provider responded"
            );

            if !completion.requests_tools() {
                return Ok(completion);
            }
            if tracker.is_exhausted() {
                return Err(AgentError::BudgetExceeded(TOOL_BUDGET_EXCEEDED.to_string()));
            }

            let registry = self.invoker.registry();
            let records: Vec<ToolCallRecord> = completion
                .tool_calls
                .iter()
                .map(|call| ToolCallRecord {
                    id: call.id.clone(),
                    tool_slug: registry
                        .slug_for_function(&call.name)
                        .unwrap_or(&call.name)
                        .to_string(),
                    arguments: call.arguments.clone(),
                })
                .collect();
            for record in &records {
                events.emit(TurnEvent::ToolCallStarted {
                    call_id: record.id.clone(),
                    tool_slug: record.tool_slug.clone(),
                });
            }

            let remaining = tracker.check_deadline()?;
            let invocations = records
                .iter()
                .map(|r| (r.tool_slug.clone(), r.arguments.clone()))
                .collect();
            let results = tokio::time::timeout(remaining, self.invoker.invoke_all(invocations, &caller))
                .await
                .map_err(|_| tracker.timeout_error())?;

            context.push(ChatMessage::assistant_with_calls(
                &completion.content,
                completion.tool_calls.clone(),
            ));
            for ((call, record), result) in completion.tool_calls.iter().zip(records).zip(results) {
                events.emit(TurnEvent::ToolCallFinished {
                    call_id: record.id.clone(),
                    tool_slug: record.tool_slug.clone(),
                    success: result.success,
                    duration_ms: result.duration_ms,
                });
                context.push(ChatMessage::tool(call, result.to_model_content()));
                progress.record(record, result);
            }
        }
    }

    /// One provider call with per-call timeout and retry, bounded by the turn deadline
    async fn complete(
        &self,
        agent: &Agent,
        context: &TurnContext,
        tools: &[ToolDefinition],
        tracker: &TurnBudgetTracker,
    ) -> Result<Completion> {
        let remaining = tracker.check_deadline()?;
        let request = CompletionRequest {
            model: agent.model.clone(),
            messages: context.messages(),
            tools: tools.to_vec(),
            temperature: agent.config.temperature,
        };
        let per_call = self.config.provider_call_timeout;
        let provider = &self.provider;

        let attempt = self.config.retry.execute_with_retry("llm_complete", || {
            let request = request.clone();
            async move {
                tokio::time::timeout(per_call, provider.complete(request))
                    .await
                    .map_err(|_| AgentError::Timeout {
                        duration_ms: per_call.as_millis() as u64,
                    })?
            }
        });

        tokio::time::timeout(remaining, attempt)
            .await
            .map_err(|_| tracker.timeout_error())?
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_success(
        &self,
        agent: &Agent,
        request: &TurnRequest,
        execution_id: Uuid,
        started: Instant,
        completion: Completion,
        progress: &mut TurnProgress,
        events: &EventSink,
    ) -> Result<TurnOutcome> {
        let mut message = NewMessage::assistant(
            completion.content.clone(),
            agent.slug.clone(),
            progress.tokens_used,
        );
        message.tool_calls = progress.tool_calls.iter().map(|c| c.call.clone()).collect();
        message.tool_results = progress.tool_calls.iter().map(|c| c.result.clone()).collect();
        message.finish_reason = completion.finish_reason.clone();
        message.citations = progress.unique_citations();

        let stored = self
            .conversations
            .append_message(request.conversation_id, message)
            .await?;
        progress.charged = true;

        let duration_ms = started.elapsed().as_millis() as u64;
        self.ledger
            .complete(
                execution_id,
                ExecutionOutcome::Completed {
                    output: completion.content.clone(),
                    tool_calls: progress.tool_calls.clone(),
                    tokens_used: progress.tokens_used,
                    duration_ms,
                },
            )
            .await?;

        info!(
            %execution_id,
            agent = %agent.slug,
            tokens = progress.tokens_used,
            tool_calls = progress.tool_calls.len(),
            citations = stored.citations.len(),
            duration_ms,
            "agent turn completed"
        );
        events.emit(TurnEvent::Completed {
            execution_id,
            output: completion.content.clone(),
            tokens_used: progress.tokens_used,
        });

        Ok(TurnOutcome {
            execution_id,
            output: completion.content,
            tokens_used: progress.tokens_used,
            tool_calls: progress.tool_calls.clone(),
            citations: stored.citations.clone(),
            message: stored,
        })
    }

    /// Close the row as failed, note the failure in the transcript and
    /// build the structured error
    #[allow(clippy::too_many_arguments)]
    async fn finish_failure(
        &self,
        agent: &Agent,
        request: &TurnRequest,
        execution_id: Uuid,
        started: Instant,
        error: AgentError,
        progress: &TurnProgress,
        events: &EventSink,
    ) -> AgentError {
        let message = error.to_string();
        let kind = error.kind();
        let duration_ms = started.elapsed().as_millis() as u64;
        warn!(
            %execution_id,
            agent = %agent.slug,
            kind = %kind,
            error = %message,
            duration_ms,
            "agent turn failed"
        );

        if let Err(e) = self
            .ledger
            .complete(
                execution_id,
                ExecutionOutcome::Failed {
                    error_message: message.clone(),
                    tool_calls: progress.tool_calls.clone(),
                    tokens_used: progress.tokens_used,
                    duration_ms,
                },
            )
            .await
        {
            error!(%execution_id, error = %e, "failed to close execution");
        }

        let note_tokens = if progress.charged { 0 } else { progress.tokens_used };
        let mut note = NewMessage::system(
            format!("Agent '{}' failed: {}", agent.slug, message),
            note_tokens,
        );
        note.agent_slug = Some(agent.slug.clone());
        note.finish_reason = Some(FAILURE_FINISH_REASON.to_string());
        if let Err(e) = self
            .conversations
            .append_message(request.conversation_id, note)
            .await
        {
            warn!(%execution_id, error = %e, "failed to record failure in conversation");
        }

        events.emit(TurnEvent::Failed {
            execution_id,
            kind,
            message: message.clone(),
        });

        ExecutionFailure {
            execution_id,
            agent_slug: agent.slug.clone(),
            workflow_slug: request.workflow_slug.clone(),
            step_index: request.step_index,
            kind,
            message,
            tokens_used: progress.tokens_used,
        }
        .into()
    }
}
