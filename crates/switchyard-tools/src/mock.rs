use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use switchyard_core::remote::RemoteToolClient;
use switchyard_core::tools::{RemoteToolDefinition, ToolError};

/// Remote tool client with canned listings and responses, for tests.
///
/// Calls without a scripted response echo back `{server, tool, args}`.
#[derive(Default)]
pub struct ScriptedRemoteClient {
    servers: BTreeMap<String, Vec<RemoteToolDefinition>>,
    responses: Mutex<HashMap<(String, String), Result<Value, ToolError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedRemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, server_id: &str, tools: Vec<RemoteToolDefinition>) -> Self {
        self.servers.insert(server_id.to_string(), tools);
        self
    }

    pub fn with_response(self, server_id: &str, tool: &str, response: Result<Value, ToolError>) -> Self {
        self.responses
            .lock()
            .insert((server_id.to_string(), tool.to_string()), response);
        self
    }

    /// `(server_id, tool)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteToolClient for ScriptedRemoteClient {
    fn server_ids(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    async fn list_tools(&self, server_id: &str) -> Result<Vec<RemoteToolDefinition>, ToolError> {
        self.servers
            .get(server_id)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(format!("server {server_id}")))
    }

    async fn call_tool(&self, server_id: &str, name: &str, args: Value) -> Result<Value, ToolError> {
        if !self.servers.contains_key(server_id) {
            return Err(ToolError::NotFound(format!("server {server_id}")));
        }
        self.calls
            .lock()
            .push((server_id.to_string(), name.to_string()));
        let key = (server_id.to_string(), name.to_string());
        match self.responses.lock().get(&key) {
            Some(resp) => resp.clone(),
            None => Ok(json!({"server": server_id, "tool": name, "args": args})),
        }
    }
}
