//! Document text extraction tool
//!
//! Text extraction itself (PDF parsing, OCR) is an external collaborator.
//! Without a configured [`DocumentExtractor`] the tool reports that
//! extraction is not available instead of inventing content.

use crate::errors::{AgentError, Result};
use crate::rag::context::truncate_chars;
use crate::tools::types::{CallerIdentity, ToolCapability, ToolOutput};
use crate::types::Tool;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Characters returned to the model per call
const MAX_TEXT_CHARS: usize = 12_000;

/// Extracts plain text from stored documents on behalf of a user
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Fails with `NotFound` for unknown documents and `Permission` for
    /// documents the user may not read
    async fn extract_text(&self, document_id: &str, user_id: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ExtractParams {
    document_id: String,
}

/// `extract_document_text` capability
#[derive(Default)]
pub struct ExtractDocumentTextTool {
    extractor: Option<Arc<dyn DocumentExtractor>>,
}

impl ExtractDocumentTextTool {
    pub fn new(extractor: Option<Arc<dyn DocumentExtractor>>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl ToolCapability for ExtractDocumentTextTool {
    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput> {
        let caller = CallerIdentity::from_params(&params)?;
        let params: ExtractParams = serde_json::from_value(params)?;

        let Some(extractor) = &self.extractor else {
            return Ok(ToolOutput::new(json!({
                "document_id": params.document_id,
                "available": false,
                "message": "document text extraction is not available",
            })));
        };

        let user_id = caller.require_user()?;
        let text = extractor.extract_text(&params.document_id, user_id).await?;
        if text.trim().is_empty() {
            return Err(AgentError::Validation(format!(
                "document '{}' has no extractable text",
                params.document_id
            )));
        }

        let total_chars = text.chars().count();
        let returned = truncate_chars(&text, MAX_TEXT_CHARS);
        Ok(ToolOutput::new(json!({
            "document_id": params.document_id,
            "available": true,
            "text": returned,
            "truncated": total_chars > MAX_TEXT_CHARS,
            "total_chars": total_chars,
        })))
    }
}

pub fn extract_document_tool() -> Tool {
    Tool {
        slug: "extract_document_text".to_string(),
        name: "Extract document text".to_string(),
        description: "Read the text content of a document attached to the case".to_string(),
        function_name: "extract_document_text".to_string(),
        parameters_schema: json!({
            "type": "object",
            "properties": {
                "document_id": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Identifier of the stored document"
                }
            },
            "required": ["document_id"]
        }),
        requires_auth: true,
        allowed_agents: None,
        is_active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::tools::types::CALLER_PARAM;

    struct FixedExtractor;

    #[async_trait]
    impl DocumentExtractor for FixedExtractor {
        async fn extract_text(&self, document_id: &str, user_id: &str) -> Result<String> {
            match (document_id, user_id) {
                ("doc-1", "lawyer-a") => Ok("PETIÇÃO INICIAL ...".to_string()),
                ("doc-1", _) => Err(AgentError::Permission("not your document".to_string())),
                _ => Err(AgentError::not_found("Document", document_id)),
            }
        }
    }

    fn params(document_id: &str, user: &str) -> serde_json::Value {
        let caller = CallerIdentity::new(Some(user.to_string()), "document-analyzer");
        let mut params = json!({ "document_id": document_id });
        params[CALLER_PARAM] = serde_json::to_value(caller).unwrap();
        params
    }

    #[tokio::test]
    async fn test_reports_not_available_without_extractor() {
        let output = ExtractDocumentTextTool::default()
            .execute(params("doc-1", "lawyer-a"))
            .await
            .unwrap();
        assert_eq!(output.value["available"], false);
    }

    #[tokio::test]
    async fn test_extracts_with_ownership() {
        let tool = ExtractDocumentTextTool::new(Some(Arc::new(FixedExtractor)));

        let output = tool.execute(params("doc-1", "lawyer-a")).await.unwrap();
        assert_eq!(output.value["available"], true);
        assert_eq!(output.value["truncated"], false);

        let err = tool.execute(params("doc-1", "lawyer-b")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }
}
