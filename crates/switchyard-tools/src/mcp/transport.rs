//! Stdio transport: spawn a tool server and exchange newline-delimited JSON-RPC.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>>;

pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

impl StdioTransport {
    /// Spawn the server process and start the stdout reader.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Arc<Self>> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn tool server: {command}"))?;

        let stdin = child.stdin.take().context("failed to capture stdin")?;
        let stdout = child.stdout.take().context("failed to capture stdout")?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        trace!(raw = %line, "server -> client");
                        // Lines without an id are server notifications.
                        let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(line) else {
                            continue;
                        };
                        let key = id_key(&resp.id);
                        match reader_pending.lock().await.remove(&key) {
                            Some(tx) => {
                                let _ = tx.send(resp);
                            }
                            None => warn!(id = %key, "response for unknown request id"),
                        }
                    }
                    Ok(None) => {
                        debug!("tool server stdout closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "error reading tool server stdout");
                        break;
                    }
                }
            }
            // Fail outstanding requests instead of leaving them to time out.
            reader_pending.lock().await.clear();
        });

        Ok(Arc::new(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            reader: Mutex::new(Some(reader)),
            timeout: REQUEST_TIMEOUT,
        }))
    }

    async fn write_line(&self, payload: String) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Send a request and wait for its response. A JSON-RPC error reply is
    /// returned as `Err`.
    pub async fn request(&self, method: &str, params: Option<serde_json::Value>) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        let key = id.to_string();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.clone(), tx);

        trace!(method, id, "client -> server");
        if let Err(e) = self.write_line(serde_json::to_string(&req)?).await {
            self.pending.lock().await.remove(&key);
            return Err(e.context(format!("failed to send {method}")));
        }

        let resp = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => bail!("tool server closed before answering {method}"),
            Err(_) => {
                self.pending.lock().await.remove(&key);
                bail!("{method} timed out after {:?}", self.timeout);
            }
        };

        if let Some(err) = &resp.error {
            bail!("server error {}: {}", err.code, err.message);
        }
        Ok(resp)
    }

    pub async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        let notif = JsonRpcNotification {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        };
        trace!(method, "client -> server (notification)");
        self.write_line(serde_json::to_string(&notif)?).await
    }

    pub async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    pub async fn kill(&self) {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        let _ = self.child.lock().await.kill().await;
    }
}

/// Pending-map key for a response id. Servers may echo a numeric id back as
/// a string, so `1` and `"1"` share a key.
fn id_key(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_kill() {
        let transport = StdioTransport::spawn("cat", &[], &HashMap::new()).await.unwrap();
        assert!(transport.is_alive().await);
        transport.kill().await;
        assert!(!transport.is_alive().await);
    }

    #[tokio::test]
    async fn spawn_nonexistent_command() {
        let result = StdioTransport::spawn("nonexistent_command_xyz_42", &[], &HashMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn request_gets_matching_response() {
        let script = r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'"#;
        let args = vec!["-c".to_string(), script.to_string()];
        let transport = StdioTransport::spawn("sh", &args, &HashMap::new()).await.unwrap();
        let resp = transport.request("ping", None).await.unwrap();
        assert_eq!(resp.result.unwrap()["ok"], true);
        transport.kill().await;
    }

    #[test]
    fn numeric_and_string_ids_share_a_key() {
        assert_eq!(id_key(&serde_json::json!(7)), "7");
        assert_eq!(id_key(&serde_json::json!("7")), "7");
    }

    #[tokio::test]
    async fn string_echoed_id_is_matched() {
        let script = r#"read line; echo '{"jsonrpc":"2.0","id":"1","result":{"ok":true}}'"#;
        let args = vec!["-c".to_string(), script.to_string()];
        let transport = StdioTransport::spawn("sh", &args, &HashMap::new()).await.unwrap();
        let resp = transport.request("ping", None).await.unwrap();
        assert_eq!(resp.result.unwrap()["ok"], true);
        transport.kill().await;
    }

    #[tokio::test]
    async fn error_reply_is_err() {
        let script =
            r#"read line; echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}}'"#;
        let args = vec!["-c".to_string(), script.to_string()];
        let transport = StdioTransport::spawn("sh", &args, &HashMap::new()).await.unwrap();
        let err = transport.request("missing", None).await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn server_exit_fails_pending_request() {
        let args = vec!["-c".to_string(), "read line; exit 0".to_string()];
        let transport = StdioTransport::spawn("sh", &args, &HashMap::new()).await.unwrap();
        let err = transport.request("ping", None).await.unwrap_err();
        assert!(err.to_string().contains("closed"), "got {err}");
    }
}
