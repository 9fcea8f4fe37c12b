//! Tool implementations module

pub mod clients;
pub mod deadlines;
pub mod documents;
pub mod knowledge;

// Re-export for convenience
pub use clients::{ClientDirectory, ClientRecord, GetClientInfoTool, InMemoryClientDirectory};
pub use deadlines::{Counting, DeadlineTool, HolidayCalendar};
pub use documents::{DocumentExtractor, ExtractDocumentTextTool};
pub use knowledge::KnowledgeSearchTool;

use crate::errors::Result;
use crate::rag::RagRetriever;
use crate::tools::registry::ToolRegistry;
use std::sync::Arc;

/// Collaborators the built-in tools depend on
#[derive(Clone)]
pub struct BuiltinTools {
    pub retriever: RagRetriever,
    pub clients: Arc<dyn ClientDirectory>,
    pub documents: Option<Arc<dyn DocumentExtractor>>,
}

/// Register the legal tool set
pub fn register_builtin_tools(registry: &mut ToolRegistry, deps: BuiltinTools) -> Result<()> {
    registry.register(
        knowledge::legislation_tool(),
        Arc::new(KnowledgeSearchTool::legislation(deps.retriever.clone())),
    )?;
    registry.register(
        knowledge::jurisprudence_tool(),
        Arc::new(KnowledgeSearchTool::jurisprudence(deps.retriever.clone())),
    )?;
    registry.register(
        knowledge::knowledge_base_tool(),
        Arc::new(KnowledgeSearchTool::knowledge_base(deps.retriever)),
    )?;
    registry.register(
        clients::client_info_tool(),
        Arc::new(GetClientInfoTool::new(deps.clients)),
    )?;
    registry.register(deadlines::deadline_tool(), Arc::new(DeadlineTool::default()))?;
    registry.register(
        documents::extract_document_tool(),
        Arc::new(ExtractDocumentTextTool::new(deps.documents)),
    )?;
    Ok(())
}
