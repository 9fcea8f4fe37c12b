//! Client lookup tool
//!
//! Client records live outside the engine and are reached through the
//! [`ClientDirectory`] collaborator. The tool only returns clients owned by
//! the calling user.

use crate::errors::{AgentError, Result};
use crate::tools::types::{CallerIdentity, ToolCapability, ToolOutput};
use crate::types::Tool;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// A client of the practice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: String,
    /// User (lawyer) who owns the client
    pub owner_user_id: String,
    pub name: String,
    /// CPF or CNPJ
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Read access to client records
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn find_client(&self, client_id: &str) -> Result<Option<ClientRecord>>;
}

/// Directory backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryClientDirectory {
    clients: DashMap<String, ClientRecord>,
}

impl InMemoryClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client: ClientRecord) {
        self.clients.insert(client.id.clone(), client);
    }
}

#[async_trait]
impl ClientDirectory for InMemoryClientDirectory {
    async fn find_client(&self, client_id: &str) -> Result<Option<ClientRecord>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct ClientParams {
    client_id: String,
}

/// Ownership-checked client lookup
pub struct GetClientInfoTool {
    directory: Arc<dyn ClientDirectory>,
}

impl GetClientInfoTool {
    pub fn new(directory: Arc<dyn ClientDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ToolCapability for GetClientInfoTool {
    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput> {
        let caller = CallerIdentity::from_params(&params)?;
        let user_id = caller.require_user()?;
        let params: ClientParams = serde_json::from_value(params)?;

        let client = self
            .directory
            .find_client(&params.client_id)
            .await?
            .ok_or_else(|| AgentError::not_found("Client", &params.client_id))?;

        if client.owner_user_id != user_id {
            return Err(AgentError::Permission(format!(
                "client '{}' belongs to another user",
                params.client_id
            )));
        }

        Ok(ToolOutput::new(json!({
            "id": client.id,
            "name": client.name,
            "document": client.document,
            "email": client.email,
            "phone": client.phone,
            "notes": client.notes,
        })))
    }
}

pub fn client_info_tool() -> Tool {
    Tool {
        slug: "get_client_info".to_string(),
        name: "Get client info".to_string(),
        description: "Fetch contact and identification data of one of the user's clients"
            .to_string(),
        function_name: "get_client_info".to_string(),
        parameters_schema: json!({
            "type": "object",
            "properties": {
                "client_id": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Identifier of the client"
                }
            },
            "required": ["client_id"]
        }),
        requires_auth: true,
        allowed_agents: None,
        is_active: true,
    }
}
