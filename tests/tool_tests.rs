//! Built-in legal tools invoked through the schema-checking invoker

mod common;

use common::{Harness, USER};
use lexflow::tools::{CallerIdentity, ToolInvoker, ToolRegistry};
use lexflow::tools::implementations::{deadlines, DeadlineTool};
use lexflow::ErrorKind;
use serde_json::json;
use std::sync::Arc;

fn caller(agent: &str) -> CallerIdentity {
    CallerIdentity::new(Some(USER.to_string()), agent)
}

#[tokio::test]
async fn test_business_day_deadline() {
    let h = Harness::new(vec![]);
    let result = h
        .invoker
        .invoke(
            "calculate_deadline",
            json!({ "start_date": "2024-03-01", "days": 5 }),
            &caller("case-strategy"),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    let value = result.result.unwrap();
    assert_eq!(value["due_date"], "2024-03-08");
    assert_eq!(value["counting"], "business");
}

#[tokio::test]
async fn test_calendar_deadline_moves_off_holiday() {
    let h = Harness::new(vec![]);
    // 2024-12-10 + 15 days lands on Christmas
    let result = h
        .invoker
        .invoke(
            "calculate_deadline",
            json!({ "start_date": "2024-12-10", "days": 15, "counting": "calendar" }),
            &caller("case-strategy"),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.result.unwrap()["due_date"], "2024-12-26");
}

#[tokio::test]
async fn test_schema_violation_is_validation_error() {
    let h = Harness::new(vec![]);
    let result = h
        .invoker
        .invoke(
            "calculate_deadline",
            json!({ "start_date": "2024-03-01" }),
            &caller("case-strategy"),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
}

#[tokio::test]
async fn test_client_lookup_requires_owner() {
    let h = Harness::new(vec![]);
    h.add_client("cli-1", USER);
    h.add_client("cli-2", "outro-advogado");

    let own = h
        .invoker
        .invoke("get_client_info", json!({ "client_id": "cli-1" }), &caller("document-analyzer"))
        .await;
    assert!(own.success);
    assert_eq!(own.result.unwrap()["name"], "Maria Souza");

    let foreign = h
        .invoker
        .invoke("get_client_info", json!({ "client_id": "cli-2" }), &caller("document-analyzer"))
        .await;
    assert_eq!(foreign.error_kind, Some(ErrorKind::Permission));

    let anonymous = h
        .invoker
        .invoke(
            "get_client_info",
            json!({ "client_id": "cli-1" }),
            &CallerIdentity::new(None, "document-analyzer"),
        )
        .await;
    assert_eq!(anonymous.error_kind, Some(ErrorKind::Permission));
}

#[tokio::test]
async fn test_tool_restricted_to_other_agents() {
    let mut tool = deadlines::deadline_tool();
    tool.allowed_agents = Some(vec!["case-strategy".to_string()]);
    let mut registry = ToolRegistry::new();
    registry.register(tool, Arc::new(DeadlineTool::default())).unwrap();
    let invoker = ToolInvoker::new(Arc::new(registry));

    let params = json!({ "start_date": "2024-03-01", "days": 5 });
    let denied = invoker
        .invoke("calculate_deadline", params.clone(), &caller("legal-research"))
        .await;
    assert!(!denied.success);
    assert_eq!(denied.error_kind, Some(ErrorKind::Permission));

    let allowed = invoker
        .invoke("calculate_deadline", params, &caller("case-strategy"))
        .await;
    assert!(allowed.success);

    let stats = invoker.stats("calculate_deadline");
    assert_eq!(stats.total_executions, 2);
    assert_eq!(stats.failed_executions, 1);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let h = Harness::new(vec![]);
    let result = h
        .invoker
        .invoke("delete_everything", json!({}), &caller("legal-research"))
        .await;
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_document_extraction_unavailable_without_extractor() {
    let h = Harness::new(vec![]);
    let result = h
        .invoker
        .invoke(
            "extract_document_text",
            json!({ "document_id": "doc-1" }),
            &caller("document-analyzer"),
        )
        .await;
    assert!(result.success);
    assert_eq!(result.result.unwrap()["available"], false);
}

#[tokio::test]
async fn test_knowledge_search_returns_citations() {
    let h = Harness::new(vec![]);
    h.seed(
        "jurisprudence",
        "Sumula 331",
        "terceirização responsabilidade subsidiária do tomador de serviços",
    )
    .await;
    h.seed("legislation", "CLT art 2", "empregador empresa que assume os riscos da atividade")
        .await;

    let result = h
        .invoker
        .invoke(
            "search_jurisprudence",
            json!({ "query": "responsabilidade subsidiária tomador de serviços" }),
            &caller("legal-research"),
        )
        .await;

    assert!(result.success);
    let value = result.result.unwrap();
    assert_eq!(value["total"], 1);
    assert_eq!(value["sources"][0]["source_type"], "jurisprudence");
    assert_eq!(result.citations.len(), 1);
    assert!(result.citations[0].confidence_score <= 1.0);
}
