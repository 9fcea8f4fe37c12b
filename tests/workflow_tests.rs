//! Sequential workflow runs over the built-in full-case-analysis workflow

mod common;

use common::{reply, test_config, Harness, USER};
use lexflow::agent::ExecutionStatus;
use lexflow::budget::TurnBudget;
use lexflow::llm::{Completion, ScriptStep};
use lexflow::store::{ConversationStore, ExecutionLedger, ExecutionQuery};
use lexflow::types::{ConversationMode, Role};
use lexflow::workflow::{WorkflowEngine, WorkflowRequest};
use lexflow::ErrorKind;
use std::time::Duration;

const CASE: &str = "Cliente demitido sem justa causa após 6 anos, sem receber verbas rescisórias.";

#[tokio::test]
async fn test_full_case_analysis_runs_every_step() {
    let h = Harness::new(vec![
        reply("Pesquisa: CLT art. 477 e Súmula 462 do TST.", 100),
        reply("Análise: verbas rescisórias não pagas no prazo.", 80),
        reply("Estratégia: reclamação trabalhista com pedido de multa do art. 477.", 120),
    ]);
    let engine = WorkflowEngine::new(h.executor.clone(), h.catalog.clone());

    let result = engine
        .run(WorkflowRequest::new("full-case-analysis", USER, CASE))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.steps_completed, 3);
    assert_eq!(result.total_steps, 3);
    assert_eq!(result.total_tokens, 300);
    assert_eq!(result.execution_ids.len(), 3);
    assert!(result.output.unwrap().starts_with("Estratégia"));

    let conversation = h.conversations.get(result.conversation_id).await.unwrap();
    assert_eq!(conversation.mode, ConversationMode::Workflow);
    assert_eq!(conversation.total_tokens, 300);

    // Request once, then one assistant message per step
    let messages = h
        .conversations
        .list_messages(result.conversation_id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, CASE);
    let authors: Vec<_> = messages[1..]
        .iter()
        .map(|m| m.agent_slug.as_deref().unwrap())
        .collect();
    assert_eq!(authors, ["legal-research", "document-analyzer", "case-strategy"]);

    // Each later step sees the previous output and the original request
    let calls = h.provider.calls().await;
    assert_eq!(calls.len(), 3);
    let step_two = calls[1].messages.last().unwrap();
    assert!(step_two.content.contains("Resultado da etapa anterior (legal-research)"));
    assert!(step_two.content.contains("CLT art. 477"));
    assert!(step_two.content.contains(CASE));

    let executions = h
        .ledger
        .list(&ExecutionQuery::conversation(result.conversation_id))
        .await
        .unwrap();
    assert!(executions
        .iter()
        .all(|e| e.status == ExecutionStatus::Completed));
    let mut steps: Vec<_> = executions.iter().map(|e| e.step_index).collect();
    steps.sort();
    assert_eq!(steps, [Some(0), Some(1), Some(2)]);
}

#[tokio::test]
async fn test_step_timeout_stops_workflow_with_partial_result() {
    let mut config = test_config();
    config.budget = TurnBudget::new(5, Duration::from_millis(300));
    let h = Harness::with_config(
        vec![
            reply("Pesquisa concluída.", 40),
            ScriptStep::delayed(
                Duration::from_secs(3),
                ScriptStep::Reply(Completion::text("tarde demais", 10)),
            ),
            reply("estratégia nunca executada", 10),
        ],
        config,
    );
    let engine = WorkflowEngine::new(h.executor.clone(), h.catalog.clone());

    let result = engine
        .run(WorkflowRequest::new("full-case-analysis", USER, CASE))
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.steps_completed, 1);
    assert_eq!(result.total_steps, 3);
    assert_eq!(result.output.as_deref(), Some("Pesquisa concluída."));
    assert_eq!(result.total_tokens, 40);

    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.agent_slug, "document-analyzer");
    assert_eq!(failure.step_index, Some(1));
    assert_eq!(failure.workflow_slug.as_deref(), Some("full-case-analysis"));

    // case-strategy never reached the provider
    assert_eq!(h.provider.call_count().await, 2);
    assert_eq!(h.provider.remaining_steps().await, 1);

    let executions = h
        .ledger
        .list(&ExecutionQuery::conversation(result.conversation_id))
        .await
        .unwrap();
    assert_eq!(executions.len(), 2);
    let research = executions
        .iter()
        .find(|e| e.agent_slug == "legal-research")
        .unwrap();
    let analyzer = executions
        .iter()
        .find(|e| e.agent_slug == "document-analyzer")
        .unwrap();
    assert_eq!(research.status, ExecutionStatus::Completed);
    assert_eq!(analyzer.status, ExecutionStatus::Failed);
    assert!(executions.iter().all(|e| e.agent_slug != "case-strategy"));

    assert_eq!(
        h.conversations.total_tokens(result.conversation_id).await.unwrap(),
        h.ledger_tokens(result.conversation_id).await
    );
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let h = Harness::new(vec![]);
    let engine = WorkflowEngine::new(h.executor.clone(), h.catalog.clone());

    let err = engine
        .run(WorkflowRequest::new("petition-pipeline", USER, CASE))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.conversations.list_by_user(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_workflow_in_existing_conversation() {
    let h = Harness::new(vec![reply("a", 1), reply("b", 2), reply("c", 3)]);
    let conversation_id = h.chat_conversation("legal-research").await;
    let engine = WorkflowEngine::new(h.executor.clone(), h.catalog.clone());

    let result = engine
        .run(WorkflowRequest::new("full-case-analysis", USER, CASE).in_conversation(conversation_id))
        .await
        .unwrap();

    assert_eq!(result.conversation_id, conversation_id);
    assert_eq!(h.conversations.list_by_user(USER).await.unwrap().len(), 1);
    assert_eq!(h.conversations.total_tokens(conversation_id).await.unwrap(), 6);
}
