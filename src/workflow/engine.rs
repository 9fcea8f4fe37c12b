//! Sequential workflow runner
//!
//! Each step is one agent turn. The step input carries the original request,
//! the previous step's output and the step instructions. The first failing
//! step stops the run; completed steps are kept and returned with the
//! failure.

use crate::agent::{AgentExecutor, CancelToken, EventSink, TurnRequest};
use crate::catalog::AgentCatalog;
use crate::errors::{AgentError, Result};
use crate::types::{NewConversation, NewMessage, Workflow, WorkflowRunResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// A workflow run request
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRequest {
    pub workflow_slug: String,
    pub input: String,
    pub user_id: String,
    /// Run inside an existing conversation instead of creating one
    pub conversation_id: Option<Uuid>,
    pub folder_id: Option<String>,
}

impl WorkflowRequest {
    pub fn new(
        workflow_slug: impl Into<String>,
        user_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            workflow_slug: workflow_slug.into(),
            input: input.into(),
            user_id: user_id.into(),
            conversation_id: None,
            folder_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_folder(mut self, folder_id: Option<String>) -> Self {
        self.folder_id = folder_id;
        self
    }
}

/// Input handed to one step
pub fn compose_step_input(
    original: &str,
    previous: Option<(&str, &str)>,
    instructions: Option<&str>,
) -> String {
    let mut input = String::new();
    if let Some(instructions) = instructions {
        input.push_str(instructions);
        input.push_str("\n\n");
    }
    input.push_str("Solicitação original:\n");
    input.push_str(original);
    if let Some((agent_slug, output)) = previous {
        input.push_str(&format!("\n\nResultado da etapa anterior ({}):\n", agent_slug));
        input.push_str(output);
    }
    input
}

#[derive(Clone)]
pub struct WorkflowEngine {
    executor: AgentExecutor,
    catalog: Arc<AgentCatalog>,
}

impl WorkflowEngine {
    pub fn new(executor: AgentExecutor, catalog: Arc<AgentCatalog>) -> Self {
        Self { executor, catalog }
    }

    pub async fn run(&self, request: WorkflowRequest) -> Result<WorkflowRunResult> {
        self.run_with(request, &EventSink::disabled(), CancelToken::never())
            .await
    }

    /// Run every step in order, stopping at the first failure
    pub async fn run_with(
        &self,
        request: WorkflowRequest,
        events: &EventSink,
        cancel: CancelToken,
    ) -> Result<WorkflowRunResult> {
        let workflow = self.catalog.workflow(&request.workflow_slug)?;
        let agents = self.catalog.resolve_sequence(workflow)?;
        if request.input.trim().is_empty() {
            return Err(AgentError::Validation("workflow input is empty".to_string()));
        }

        let conversation_id = self.open_conversation(workflow, &request).await?;
        self.executor
            .conversations()
            .append_message(conversation_id, NewMessage::user(&request.input))
            .await?;

        let started = Instant::now();
        let mut result = WorkflowRunResult {
            workflow_slug: workflow.slug.clone(),
            conversation_id,
            output: None,
            steps_completed: 0,
            total_steps: agents.len(),
            total_tokens: 0,
            execution_ids: Vec::with_capacity(agents.len()),
            failure: None,
        };
        info!(
            workflow = %workflow.slug,
            %conversation_id,
            steps = agents.len(),
            "workflow started"
        );

        let mut previous: Option<(String, String)> = None;
        for (index, agent) in agents.into_iter().enumerate() {
            let step = workflow.step_config(&agent.slug);
            let input = compose_step_input(
                &request.input,
                previous.as_ref().map(|(slug, out)| (slug.as_str(), out.as_str())),
                step.and_then(|s| s.instructions.as_deref()),
            );
            let turn = TurnRequest::workflow_step(
                conversation_id,
                Some(request.user_id.clone()),
                &workflow.slug,
                index,
                input,
            )
            .with_max_tool_iterations(step.and_then(|s| s.max_tool_iterations));

            match self.executor.run(agent, turn, events, cancel.clone()).await {
                Ok(outcome) => {
                    info!(
                        workflow = %workflow.slug,
                        step = index + 1,
                        agent = %agent.slug,
                        tokens = outcome.tokens_used,
                        "workflow step completed"
                    );
                    result.execution_ids.push(outcome.execution_id);
                    result.total_tokens += outcome.tokens_used;
                    result.steps_completed += 1;
                    result.output = Some(outcome.output.clone());
                    previous = Some((agent.slug.clone(), outcome.output));
                }
                Err(AgentError::ExecutionFailed(failure)) => {
                    warn!(
                        workflow = %workflow.slug,
                        step = index + 1,
                        agent = %agent.slug,
                        error = %failure.message,
                        "workflow step failed, stopping"
                    );
                    result.execution_ids.push(failure.execution_id);
                    result.total_tokens += failure.tokens_used;
                    result.failure = Some(*failure);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            workflow = %workflow.slug,
            %conversation_id,
            steps_completed = result.steps_completed,
            total_steps = result.total_steps,
            total_tokens = result.total_tokens,
            duration_ms = started.elapsed().as_millis() as u64,
            success = result.is_success(),
            "workflow finished"
        );
        Ok(result)
    }

    async fn open_conversation(&self, workflow: &Workflow, request: &WorkflowRequest) -> Result<Uuid> {
        let conversations = self.executor.conversations();
        match request.conversation_id {
            Some(id) => {
                let conversation = conversations.get(id).await?;
                if !conversation.is_active {
                    return Err(AgentError::not_found("Conversation", id.to_string()));
                }
                if conversation.user_id != request.user_id {
                    return Err(AgentError::Permission(format!(
                        "conversation {} belongs to another user",
                        id
                    )));
                }
                Ok(id)
            }
            None => {
                let conversation = conversations
                    .create(
                        NewConversation::workflow(&request.user_id)
                            .with_folder(request.folder_id.clone())
                            .with_title(Some(workflow.name.clone())),
                    )
                    .await?;
                Ok(conversation.id)
            }
        }
    }
}
