use std::collections::HashMap;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use switchyard_core::remote::RemoteToolClient;
use switchyard_core::tools::{ParamSpec, RemoteToolDefinition, ToolDefinition, ToolError};

use crate::schema::infer_schema;

/// An in-process tool implementation.
#[async_trait]
pub trait LocalHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Adapts an async closure into a [`LocalHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> LocalHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        (self.0)(args).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn LocalHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

pub struct LocalTool {
    pub params: Vec<ParamSpec>,
    pub handler: Arc<dyn LocalHandler>,
}

/// How a registered tool is executed.
pub enum ToolKind {
    Local(LocalTool),
    Remote { server_id: String, remote_name: String },
}

pub struct Tool {
    pub definition: ToolDefinition,
    pub kind: ToolKind,
}

impl Tool {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, ToolKind::Remote { .. })
    }

    /// Remote tools are exposed as `{server_id}_{name}` and described by the
    /// first line of the remote description.
    pub fn remote(server_id: &str, def: &RemoteToolDefinition) -> Self {
        let description = def
            .description
            .as_deref()
            .unwrap_or("")
            .trim()
            .lines()
            .next()
            .unwrap_or("")
            .to_string();
        Self {
            definition: ToolDefinition {
                name: format!("{server_id}_{}", def.name),
                description,
                parameters: def.input_schema.clone(),
            },
            kind: ToolKind::Remote {
                server_id: server_id.to_string(),
                remote_name: def.name.clone(),
            },
        }
    }
}

/// Add-only registry of local and remote tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<Tool>>>,
    remote: Option<Arc<dyn RemoteToolClient>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            remote: None,
        }
    }

    pub fn with_remote(client: Arc<dyn RemoteToolClient>) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            remote: Some(client),
        }
    }

    pub fn remote_client(&self) -> Option<&Arc<dyn RemoteToolClient>> {
        self.remote.as_ref()
    }

    /// Register a tool. Fails without touching the registry if the name is taken.
    pub fn register(&self, tool: Tool) -> Result<(), ToolError> {
        let mut tools = self.tools.write();
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        debug!(tool = %name, remote = tool.is_remote(), "registered tool");
        tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Register an in-process tool. Without an explicit schema, one is
    /// inferred from `params`.
    pub fn register_local(
        &self,
        name: &str,
        description: &str,
        schema: Option<Value>,
        params: Vec<ParamSpec>,
        handler: Arc<dyn LocalHandler>,
    ) -> Result<(), ToolError> {
        let parameters = schema.unwrap_or_else(|| infer_schema(&params));
        self.register(Tool {
            definition: ToolDefinition {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
            kind: ToolKind::Local(LocalTool { params, handler }),
        })
    }

    /// Register every tool advertised by `server_id`. Any name conflict
    /// (with the registry or inside the batch) rejects the whole batch.
    pub fn register_remote_batch(
        &self,
        server_id: &str,
        definitions: &[RemoteToolDefinition],
    ) -> Result<Vec<String>, ToolError> {
        let batch: Vec<Tool> = definitions.iter().map(|d| Tool::remote(server_id, d)).collect();

        let mut tools = self.tools.write();
        let mut seen = std::collections::HashSet::new();
        for tool in &batch {
            if tools.contains_key(tool.name()) || !seen.insert(tool.name().to_string()) {
                return Err(ToolError::AlreadyRegistered(tool.name().to_string()));
            }
        }

        let names: Vec<String> = batch.iter().map(|t| t.name().to_string()).collect();
        for tool in batch {
            tools.insert(tool.name().to_string(), Arc::new(tool));
        }
        info!(server = server_id, count = names.len(), "registered remote tools");
        Ok(names)
    }

    /// Ask the remote client for `server_id`'s tools and register them.
    pub async fn discover(&self, server_id: &str) -> Result<Vec<String>, ToolError> {
        let client = self
            .remote
            .as_ref()
            .ok_or_else(|| ToolError::Transport("no remote tool client configured".into()))?;
        let defs = client.list_tools(server_id).await?;
        self.register_remote_batch(server_id, &defs)
    }

    /// Resolve `name` and run it.
    #[instrument(skip(self, args), fields(tool = %name))]
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        match &tool.kind {
            ToolKind::Local(local) => {
                let args = normalize_args(args)?;
                check_required(&local.params, &args)?;
                match AssertUnwindSafe(local.handler.call(args)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let message = panic_text(payload.as_ref());
                        error!(error = %message, "local tool panicked");
                        Err(ToolError::ExecutionFailed(message))
                    }
                }
            }
            ToolKind::Remote {
                server_id,
                remote_name,
            } => {
                let client = self.remote.as_ref().ok_or_else(|| {
                    ToolError::Transport("no remote tool client configured".into())
                })?;
                client
                    .call_tool(server_id, remote_name, normalize_args(args)?)
                    .await
            }
        }
    }

    /// Run [`invoke`](Self::invoke) from a blocking thread spawned by the runtime.
    pub fn invoke_blocking(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ToolError::ExecutionFailed(format!("no async runtime: {e}")))?;
        handle.block_on(self.invoke(name, args))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .values()
            .map(|t| t.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn count(&self) -> usize {
        self.tools.read().len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

fn normalize_args(args: Value) -> Result<Value, ToolError> {
    match args {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(args),
        other => Err(ToolError::InvalidArguments(format!(
            "arguments must be an object, got {other}"
        ))),
    }
}

fn check_required(params: &[ParamSpec], args: &Value) -> Result<(), ToolError> {
    let missing: Vec<&str> = params
        .iter()
        .filter(|p| !p.has_default)
        .filter(|p| args.get(&p.name).map_or(true, Value::is_null))
        .map(|p| p.name.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(format!(
            "missing required argument(s): {}",
            missing.join(", ")
        )))
    }
}
