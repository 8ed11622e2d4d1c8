use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use switchyard_core::tools::ToolError;

use super::str_arg;
use crate::registry::LocalHandler;

/// Runs a command through `sh -c`. Returns trimmed stdout on success,
/// trimmed stderr otherwise.
pub struct ExecuteCommand;

#[async_trait]
impl LocalHandler for ExecuteCommand {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let command = str_arg(&args, "command")?;
        debug!(command, "executing shell command");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to execute command: {e}")))?;

        let stream = if output.status.success() {
            &output.stdout
        } else {
            &output.stderr
        };
        Ok(Value::String(String::from_utf8_lossy(stream).trim().to_string()))
    }
}
