//! Agent turn execution: tool loop, budgets, retry, cancellation and
//! token accounting against in-memory stores

mod common;

use async_trait::async_trait;
use common::{reply, search, test_config, tool_call, Harness, USER};
use lexflow::agent::{
    AgentExecutor, CancelHandle, EventSink, ExecutionStatus, TurnEvent, TurnRequest,
};
use lexflow::budget::TurnBudget;
use lexflow::llm::{RetryPolicy, ScriptStep};
use lexflow::store::{ConversationStore, ExecutionLedger, ExecutionQuery, InMemoryExecutionLedger};
use lexflow::types::{AgentExecution, ExecutionOutcome, ExecutionStats, NewExecution, Role};
use lexflow::{AgentError, ErrorKind};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Ledger that rejects closing a row as completed
struct RejectingLedger(InMemoryExecutionLedger);

#[async_trait]
impl ExecutionLedger for RejectingLedger {
    async fn start(&self, execution: NewExecution) -> lexflow::Result<AgentExecution> {
        self.0.start(execution).await
    }

    async fn complete(&self, id: Uuid, outcome: ExecutionOutcome) -> lexflow::Result<AgentExecution> {
        match outcome {
            ExecutionOutcome::Completed { .. } => {
                Err(AgentError::Storage("ledger unavailable".to_string()))
            }
            failed => self.0.complete(id, failed).await,
        }
    }

    async fn get(&self, id: Uuid) -> lexflow::Result<AgentExecution> {
        self.0.get(id).await
    }

    async fn list(&self, query: &ExecutionQuery) -> lexflow::Result<Vec<AgentExecution>> {
        self.0.list(query).await
    }

    async fn statistics(&self, agent_slug: Option<&str>) -> lexflow::Result<ExecutionStats> {
        self.0.statistics(agent_slug).await
    }

    async fn failed_executions(
        &self,
        agent_slug: Option<&str>,
        limit: Option<usize>,
    ) -> lexflow::Result<Vec<AgentExecution>> {
        self.0.failed_executions(agent_slug, limit).await
    }
}

#[tokio::test]
async fn test_legal_research_answers_with_tool_and_citations() {
    let h = Harness::new(vec![
        search("c1", "prescrição trabalhista prazo", 30),
        reply("O prazo prescricional é de cinco anos (CF art. 7º, XXIX).", 50),
    ]);
    h.seed(
        "legislation",
        "CF art 7",
        "prescrição trabalhista prazo de cinco anos até o limite de dois anos após a extinção do contrato",
    )
    .await;

    let agent = h.catalog.agent("legal-research").unwrap();
    let conversation_id = h.chat_conversation("legal-research").await;
    let outcome = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(
                conversation_id,
                Some(USER.to_string()),
                "qual o prazo de prescrição trabalhista?",
            ),
        )
        .await
        .unwrap();

    assert_eq!(outcome.tokens_used, 80);
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].call.tool_slug, "search_legislation");
    assert!(outcome.tool_calls[0].result.success);
    assert!(!outcome.citations.is_empty());
    assert!(outcome
        .citations
        .iter()
        .all(|c| (0.0..=1.0).contains(&c.confidence_score)));

    // Input, then one assistant message carrying the turn tokens
    let messages = h.conversations.list_messages(conversation_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].tokens, 0);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].tokens, 80);
    assert_eq!(messages[1].agent_slug.as_deref(), Some("legal-research"));
    assert_eq!(messages[1].tool_calls.len(), 1);

    let executions = h
        .ledger
        .list(&ExecutionQuery::conversation(conversation_id))
        .await
        .unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert_eq!(executions[0].tokens_used, 80);
    assert!(executions[0].duration_ms.is_some());

    assert_eq!(
        h.conversations.total_tokens(conversation_id).await.unwrap(),
        h.ledger_tokens(conversation_id).await
    );
}

#[tokio::test]
async fn test_rag_context_sent_to_provider() {
    let h = Harness::new(vec![reply("Resposta com base nas fontes.", 20)]);
    h.seed(
        "jurisprudence",
        "Sumula 331",
        "terceirização responsabilidade subsidiária do tomador de serviços",
    )
    .await;

    let agent = h.catalog.agent("legal-research").unwrap();
    let conversation_id = h.chat_conversation("legal-research").await;
    h.executor
        .run_turn(
            agent,
            TurnRequest::chat(
                conversation_id,
                Some(USER.to_string()),
                "responsabilidade subsidiária na terceirização",
            ),
        )
        .await
        .unwrap();

    let calls = h.provider.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(calls[0]
        .messages
        .iter()
        .any(|m| m.content.contains("Relevant sources from the knowledge base")));
    assert!(!calls[0].tools.is_empty());
}

#[tokio::test]
async fn test_tool_budget_exceeded_records_failure() {
    // legal-research allows three provider rounds
    let h = Harness::new(vec![
        search("c1", "férias", 10),
        search("c2", "férias proporcionais", 10),
        search("c3", "férias vencidas", 10),
        reply("never reached", 10),
    ]);
    let agent = h.catalog.agent("legal-research").unwrap();
    let conversation_id = h.chat_conversation("legal-research").await;

    let err = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "férias"),
        )
        .await
        .unwrap_err();

    let failure = err.execution_failure().expect("structured failure");
    assert_eq!(failure.kind, ErrorKind::BudgetExceeded);
    assert_eq!(failure.message, "tool call budget exceeded");
    assert_eq!(failure.tokens_used, 30);
    assert_eq!(h.provider.call_count().await, 3);

    let execution = h.ledger.get(failure.execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        execution.error_message.as_deref(),
        Some("tool call budget exceeded")
    );
    assert_eq!(execution.tool_calls.len(), 2);
    assert_eq!(execution.tokens_used, 30);

    let messages = h.conversations.list_messages(conversation_id).await.unwrap();
    let note = messages.last().unwrap();
    assert_eq!(note.role, Role::System);
    assert_eq!(note.finish_reason.as_deref(), Some("error"));
    assert_eq!(
        h.conversations.total_tokens(conversation_id).await.unwrap(),
        h.ledger_tokens(conversation_id).await
    );
}

#[tokio::test]
async fn test_request_override_wins_over_agent_setting() {
    let h = Harness::new(vec![search("c1", "aviso prévio", 5), reply("unused", 5)]);
    let agent = h.catalog.agent("legal-research").unwrap();
    let conversation_id = h.chat_conversation("legal-research").await;

    let err = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "aviso prévio")
                .with_max_tool_iterations(Some(1)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BudgetExceeded);
    assert_eq!(h.provider.call_count().await, 1);
}

#[tokio::test]
async fn test_turn_deadline_times_out() {
    let h = Harness::new(vec![ScriptStep::delayed(
        Duration::from_secs(2),
        ScriptStep::Reply(lexflow::llm::Completion::text("late", 10)),
    )]);
    let agent = h.catalog.agent("case-strategy").unwrap();
    let conversation_id = h.chat_conversation("case-strategy").await;

    let err = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "estratégia")
                .with_time_budget(Some(Duration::from_millis(100))),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    let failure = err.execution_failure().unwrap();
    let execution = h.ledger.get(failure.execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.tokens_used, 0);
}

#[tokio::test]
async fn test_provider_failure_is_retried() {
    let mut config = test_config();
    config.retry = RetryPolicy::with_config(3, 1).without_jitter();
    let h = Harness::with_config(
        vec![
            ScriptStep::Fail("503 service unavailable".to_string()),
            reply("Segunda tentativa.", 12),
        ],
        config,
    );
    let agent = h.catalog.agent("case-strategy").unwrap();
    let conversation_id = h.chat_conversation("case-strategy").await;

    let outcome = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "estratégia"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.output, "Segunda tentativa.");
    assert_eq!(h.provider.call_count().await, 2);
}

#[tokio::test]
async fn test_provider_failure_without_retry_fails_turn() {
    let h = Harness::new(vec![ScriptStep::Fail("connection refused".to_string())]);
    let agent = h.catalog.agent("case-strategy").unwrap();
    let conversation_id = h.chat_conversation("case-strategy").await;

    let err = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "estratégia"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::ExecutionFailed(_)));
    assert_eq!(err.kind(), ErrorKind::Provider);
    let stats = h.ledger.statistics(Some("case-strategy")).await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.running, 0);
}

#[tokio::test]
async fn test_cancelled_turn_records_failed_execution() {
    let h = Harness::new(vec![ScriptStep::delayed(
        Duration::from_secs(5),
        ScriptStep::Reply(lexflow::llm::Completion::text("late", 10)),
    )]);
    let agent = h.catalog.agent("case-strategy").unwrap().clone();
    let conversation_id = h.chat_conversation("case-strategy").await;

    let (handle, token) = CancelHandle::pair();
    let (sink, mut events) = EventSink::channel(32);
    let executor = h.executor.clone();
    let task = tokio::spawn(async move {
        executor
            .run(
                &agent,
                TurnRequest::chat(conversation_id, Some(USER.to_string()), "estratégia"),
                &sink,
                token,
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let mut terminal = None;
    while let Some(event) = events.recv().await {
        if event.is_terminal() {
            terminal = Some(event);
            break;
        }
    }
    assert!(matches!(
        terminal,
        Some(TurnEvent::Failed {
            kind: ErrorKind::Cancelled,
            ..
        })
    ));

    let executions = h
        .ledger
        .list(&ExecutionQuery::conversation(conversation_id))
        .await
        .unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn test_dropped_turn_closes_execution() {
    let h = Harness::new(vec![ScriptStep::delayed(
        Duration::from_secs(5),
        ScriptStep::Reply(lexflow::llm::Completion::text("late", 10)),
    )]);
    let agent = h.catalog.agent("case-strategy").unwrap();
    let conversation_id = h.chat_conversation("case-strategy").await;

    let turn = h.executor.run_turn(
        agent,
        TurnRequest::chat(conversation_id, Some(USER.to_string()), "estratégia"),
    );
    assert!(tokio::time::timeout(Duration::from_millis(50), turn)
        .await
        .is_err());

    // The row is closed by a task spawned from the drop
    let mut closed = None;
    for _ in 0..50 {
        let executions = h
            .ledger
            .list(&ExecutionQuery::conversation(conversation_id))
            .await
            .unwrap();
        assert_eq!(executions.len(), 1);
        if executions[0].status != ExecutionStatus::Running {
            closed = Some(executions[0].clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let row = closed.expect("execution left running");
    assert_eq!(row.status, ExecutionStatus::Failed);
    assert!(row.error_message.unwrap().contains("dropped"));
    assert!(row.completed_at.is_some());
}

#[tokio::test]
async fn test_failed_tool_result_fed_back_to_model() {
    // The client belongs to someone else; the lookup fails but the turn goes on
    let h = Harness::new(vec![
        tool_call(
            "c1",
            "get_client_info",
            json!({ "client_id": "cli-1" }),
            8,
        ),
        reply("Cliente de outro usuário; não posso acessar.", 9),
    ]);
    h.add_client("cli-1", "outro-advogado");
    let agent = h.catalog.agent("document-analyzer").unwrap();
    let conversation_id = h.chat_conversation("document-analyzer").await;

    let outcome = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "dados do cliente cli-1"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.tool_calls.len(), 1);
    let result = &outcome.tool_calls[0].result;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("another user"));

    // The failed tool output reached the second provider call
    let calls = h.provider.calls().await;
    assert_eq!(calls.len(), 2);
    assert!(calls[1]
        .messages
        .iter()
        .any(|m| m.tool_call_id.as_deref() == Some("c1")));
}

#[tokio::test]
async fn test_history_replayed_on_second_turn() {
    let h = Harness::new(vec![reply("Primeira resposta.", 10), reply("Segunda resposta.", 15)]);
    let agent = h.catalog.agent("case-strategy").unwrap();
    let conversation_id = h.chat_conversation("case-strategy").await;

    for input in ["primeira pergunta", "segunda pergunta"] {
        h.executor
            .run_turn(
                agent,
                TurnRequest::chat(conversation_id, Some(USER.to_string()), input),
            )
            .await
            .unwrap();
    }

    let calls = h.provider.calls().await;
    assert!(calls[1]
        .messages
        .iter()
        .any(|m| m.content == "Primeira resposta."));
    assert_eq!(h.conversations.total_tokens(conversation_id).await.unwrap(), 25);
    assert_eq!(h.ledger_tokens(conversation_id).await, 25);
}

#[tokio::test]
async fn test_inactive_conversation_rejected_before_execution() {
    let h = Harness::new(vec![reply("unused", 1)]);
    let agent = h.catalog.agent("case-strategy").unwrap();
    let conversation_id = h.chat_conversation("case-strategy").await;
    h.conversations.soft_delete(conversation_id).await.unwrap();

    let err = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "olá"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.provider.call_count().await, 0);
    assert_eq!(h.ledger.statistics(None).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_executor_default_budget_applies_without_overrides() {
    let mut config = test_config();
    config.budget = TurnBudget::new(1, Duration::from_secs(10));
    let h = Harness::with_config(
        vec![tool_call(
            "c1",
            "calculate_deadline",
            json!({ "start_date": "2024-03-01", "days": 15 }),
            4,
        )],
        config,
    );
    // case-strategy has no max_tool_iterations of its own
    let agent = h.catalog.agent("case-strategy").unwrap();
    let conversation_id = h.chat_conversation("case-strategy").await;

    let err = h
        .executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "prazo"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BudgetExceeded);
}

#[tokio::test]
async fn test_failed_close_after_answer_charges_tokens_once() {
    let h = Harness::new(vec![reply("Cabe agravo de instrumento.", 40)]);
    let ledger = Arc::new(RejectingLedger(InMemoryExecutionLedger::new()));
    let executor = AgentExecutor::new(
        h.provider.clone(),
        h.invoker.clone(),
        h.conversations.clone(),
        ledger.clone(),
    )
    .with_config(test_config());
    let agent = h.catalog.agent("case-strategy").unwrap();
    let conversation_id = h.chat_conversation("case-strategy").await;

    let err = executor
        .run_turn(
            agent,
            TurnRequest::chat(conversation_id, Some(USER.to_string()), "recurso cabível?"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let messages = h.conversations.list_messages(conversation_id).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].tokens, 40);
    assert_eq!(messages[2].role, Role::System);
    assert_eq!(messages[2].tokens, 0);

    let executions = ledger
        .list(&ExecutionQuery::conversation(conversation_id))
        .await
        .unwrap();
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert_eq!(executions[0].tokens_used, 40);
    assert_eq!(h.conversations.total_tokens(conversation_id).await.unwrap(), 40);
}
