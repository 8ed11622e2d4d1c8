use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use switchyard_core::remote::RemoteToolClient;
use switchyard_core::tools::{RemoteToolDefinition, ToolError};

use super::client::McpClient;
use super::config::{McpServerConfig, McpServersConfig};

/// [`RemoteToolClient`] over MCP stdio servers.
///
/// Every call opens a fresh session (spawn, handshake, request, kill).
/// Tool listings are cached per server for the life of the client.
pub struct McpRemoteClient {
    servers: BTreeMap<String, McpServerConfig>,
    listings: DashMap<String, Vec<RemoteToolDefinition>>,
}

impl McpRemoteClient {
    pub fn new(config: McpServersConfig) -> Self {
        Self {
            servers: config.servers,
            listings: DashMap::new(),
        }
    }

    async fn open(&self, server_id: &str) -> Result<McpClient, ToolError> {
        let cfg = self
            .servers
            .get(server_id)
            .ok_or_else(|| ToolError::NotFound(format!("tool server {server_id}")))?;
        McpClient::connect(server_id, &cfg.command, &cfg.args, &cfg.env)
            .await
            .map_err(|e| ToolError::Transport(format!("{server_id}: {e:#}")))
    }
}

#[async_trait]
impl RemoteToolClient for McpRemoteClient {
    fn server_ids(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    async fn list_tools(&self, server_id: &str) -> Result<Vec<RemoteToolDefinition>, ToolError> {
        if let Some(cached) = self.listings.get(server_id) {
            debug!(server = server_id, "using cached tool listing");
            return Ok(cached.clone());
        }

        let mut session = self.open(server_id).await?;
        let listed = session.list_tools().await;
        session.shutdown().await;

        let tools = listed.map_err(|e| ToolError::Transport(format!("{server_id}: {e:#}")))?;
        self.listings.insert(server_id.to_string(), tools.clone());
        Ok(tools)
    }

    async fn call_tool(&self, server_id: &str, name: &str, args: Value) -> Result<Value, ToolError> {
        let mut session = self.open(server_id).await?;
        let called = session.call_tool(name, args).await;
        session.shutdown().await;

        let result = called.map_err(|e| ToolError::Transport(format!("{server_id}: {e:#}")))?;
        if result.is_error {
            let message = result
                .text()
                .unwrap_or_else(|| "remote tool reported an error".to_string());
            warn!(server = server_id, tool = name, %message, "remote tool failed");
            return Err(ToolError::Remote {
                server: server_id.to_string(),
                message,
            });
        }
        Ok(result.into_value())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    const INIT: &str = r#"read l; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"fake","version":"1"}}}'; read l; read l; "#;

    fn fake_server(reply: &str, env: HashMap<String, String>) -> McpServerConfig {
        let script = format!(
            "{INIT}[ -n \"$COUNT_FILE\" ] && echo x >> \"$COUNT_FILE\"; printf '%s\\n' '{reply}'"
        );
        McpServerConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script],
            env,
        }
    }

    fn client_for(id: &str, cfg: McpServerConfig) -> McpRemoteClient {
        let mut servers = BTreeMap::new();
        servers.insert(id.to_string(), cfg);
        McpRemoteClient::new(McpServersConfig { servers })
    }

    #[tokio::test]
    async fn lists_tools_and_caches() {
        let counter = std::env::temp_dir().join(format!("switchyard_count_{}", uuid::Uuid::now_v7()));
        let mut env = HashMap::new();
        env.insert("COUNT_FILE".to_string(), counter.to_string_lossy().into_owned());
        let reply = r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"add","description":"Add numbers","inputSchema":{"type":"object","properties":{"a":{"type":"integer"}}}}]}}"#;
        let client = client_for("math", fake_server(reply, env));

        let first = client.list_tools("math").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "add");
        assert_eq!(first[0].input_schema["properties"]["a"]["type"], "integer");

        let second = client.list_tools("math").await.unwrap();
        assert_eq!(second, first);
        let spawns = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(spawns.lines().count(), 1);
        std::fs::remove_file(&counter).ok();
    }

    #[tokio::test]
    async fn call_returns_text_content() {
        let reply = r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"3"}]}}"#;
        let client = client_for("math", fake_server(reply, HashMap::new()));
        let out = client.call_tool("math", "add", json!({"a": 1, "b": 2})).await.unwrap();
        assert_eq!(out, json!("3"));
    }

    #[tokio::test]
    async fn call_error_is_remote_error() {
        let reply = r#"{"jsonrpc":"2.0","id":2,"result":{"isError":true,"content":[{"type":"text","text":"division by zero"}]}}"#;
        let client = client_for("math", fake_server(reply, HashMap::new()));
        let err = client.call_tool("math", "div", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ToolError::Remote {
                server: "math".into(),
                message: "division by zero".into()
            }
        );
    }

    #[tokio::test]
    async fn unknown_server() {
        let client = McpRemoteClient::new(McpServersConfig::default());
        assert!(client.server_ids().is_empty());
        let err = client.list_tools("nope").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn spawn_failure_is_transport_error() {
        let cfg = McpServerConfig {
            command: "nonexistent_command_xyz_42".into(),
            args: vec![],
            env: HashMap::new(),
        };
        let client = client_for("broken", cfg);
        let err = client.list_tools("broken").await.unwrap_err();
        assert!(matches!(err, ToolError::Transport(_)));
    }
}
