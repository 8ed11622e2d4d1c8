//! One MCP session: handshake, tool listing and tool calls against a single server.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use switchyard_core::tools::RemoteToolDefinition;

use super::transport::StdioTransport;
use super::types::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, ToolsCallParams,
    ToolsCallResult, ToolsListResult, PROTOCOL_VERSION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpClientState {
    /// Transport spawned, not yet initialized.
    Connected,
    /// `initialize` completed, `initialized` notification sent.
    Ready,
    Closed,
}

pub struct McpClient {
    server_id: String,
    transport: Arc<StdioTransport>,
    state: McpClientState,
}

impl McpClient {
    /// Spawn the server and perform the handshake.
    pub async fn connect(
        server_id: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let transport = StdioTransport::spawn(command, args, env).await?;
        let mut client = Self {
            server_id: server_id.into(),
            transport,
            state: McpClientState::Connected,
        };
        if let Err(e) = client.initialize().await {
            client.shutdown().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "switchyard".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        let resp = self
            .transport
            .request("initialize", Some(serde_json::to_value(&params)?))
            .await
            .context("initialize request failed")?;
        let result: InitializeResult =
            serde_json::from_value(resp.result.context("initialize returned no result")?)
                .context("failed to parse initialize result")?;

        info!(
            server = %self.server_id,
            protocol = %result.protocol_version,
            server_name = %result.server_info.name,
            "tool server initialized"
        );

        self.transport.notify("notifications/initialized", None).await?;
        self.state = McpClientState::Ready;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<RemoteToolDefinition>> {
        self.ensure_ready()?;
        let resp = self.transport.request("tools/list", None).await?;
        let result: ToolsListResult =
            serde_json::from_value(resp.result.context("tools/list returned no result")?)?;
        debug!(server = %self.server_id, count = result.tools.len(), "fetched remote tools");
        Ok(result.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        self.ensure_ready()?;
        let params = ToolsCallParams {
            name: name.into(),
            arguments,
        };
        let resp = self
            .transport
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        let result = serde_json::from_value(resp.result.context("tools/call returned no result")?)?;
        Ok(result)
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn state(&self) -> McpClientState {
        self.state
    }

    pub async fn shutdown(&mut self) {
        self.state = McpClientState::Closed;
        self.transport.kill().await;
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state != McpClientState::Ready {
            anyhow::bail!(
                "session for '{}' is not ready (state: {:?})",
                self.server_id,
                self.state
            );
        }
        Ok(())
    }
}
