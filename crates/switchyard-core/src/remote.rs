use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{RemoteToolDefinition, ToolError};

/// Client for a remote tool protocol (one or more named tool servers).
#[async_trait]
pub trait RemoteToolClient: Send + Sync {
    /// Ids of every configured server.
    fn server_ids(&self) -> Vec<String>;

    async fn list_tools(&self, server_id: &str) -> Result<Vec<RemoteToolDefinition>, ToolError>;

    /// Returns the tool's result payload, or `ToolError::Remote` when the
    /// server reports the call as failed.
    async fn call_tool(&self, server_id: &str, name: &str, args: Value) -> Result<Value, ToolError>;
}
