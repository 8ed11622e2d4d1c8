use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use switchyard_core::tools::ToolError;

use super::{parse_params, BlockingMethodHandler, MethodHandler, RpcContext};
use crate::rpc::{ErrorCode, RpcError};

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    format: Option<String>,
}

/// `{"tools": [...]}` in flat (default) or nested form.
pub struct ListToolsHandler;

#[async_trait]
impl MethodHandler for ListToolsHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let p: ListParams = parse_params(params)?;
        let defs = ctx.state.tools.definitions();
        let tools: Vec<Value> = match p.format.as_deref() {
            None | Some("flat") => defs.iter().map(|d| d.to_flat()).collect(),
            Some("nested") => defs.iter().map(|d| d.to_nested()).collect(),
            Some(other) => {
                return Err(RpcError::invalid_params(format!(
                    "unknown format '{other}' (expected flat or nested)"
                )))
            }
        };
        Ok(json!({"tools": tools}))
    }
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Runs a tool. Unknown tools and bad arguments are request errors; anything
/// that fails while running is reported inside the result.
pub struct CallToolHandler;

impl BlockingMethodHandler for CallToolHandler {
    fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let p: CallParams = parse_params(params)?;
        match ctx.state.tools.invoke_blocking(&p.name, p.arguments) {
            Ok(result) => Ok(json!({"ok": true, "result": result})),
            Err(e @ (ToolError::NotFound(_) | ToolError::InvalidArguments(_))) => {
                Err(RpcError::invalid_params(e.to_string()).with_data(e.to_value()))
            }
            Err(e) => {
                warn!(conn_id = %ctx.connection_id, tool = %p.name, error = %e, "tool call failed");
                Ok(json!({"ok": false, "error": e.to_value()}))
            }
        }
    }
}

#[derive(Deserialize)]
struct DiscoverParams {
    server: String,
}

/// Fetch a remote server's tool listing and register it.
pub struct DiscoverToolsHandler;

#[async_trait]
impl MethodHandler for DiscoverToolsHandler {
    #[instrument(skip_all, fields(method = "tools/discover"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let p: DiscoverParams = parse_params(params)?;
        match ctx.state.tools.discover(&p.server).await {
            Ok(registered) => {
                info!(server = %p.server, count = registered.len(), "tools discovered");
                Ok(json!({"ok": true, "server": p.server, "registered": registered}))
            }
            Err(e @ ToolError::NotFound(_)) => Err(RpcError::invalid_params(e.to_string())),
            Err(e @ ToolError::Transport(_)) => {
                Err(RpcError::new(ErrorCode::TransportError, e.to_string()).with_data(e.to_value()))
            }
            Err(e) => Err(RpcError::new(ErrorCode::ServerError, e.to_string()).with_data(e.to_value())),
        }
    }
}
