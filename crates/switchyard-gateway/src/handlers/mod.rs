//! RPC method handlers and the method table.

pub mod ai;
pub mod basic;
pub mod tools;
pub mod topics;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use switchyard_core::ids::ConnectionId;

use crate::rpc::RpcError;
use crate::state::GatewayState;

/// Per-request context handed to every handler.
#[derive(Clone)]
pub struct RpcContext {
    pub connection_id: ConnectionId,
    pub state: Arc<GatewayState>,
}

/// Handler that runs inline on the connection task.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Handler that may block; dispatched onto the worker pool.
pub trait BlockingMethodHandler: Send + Sync {
    fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

#[derive(Clone)]
pub enum Handler {
    Async(Arc<dyn MethodHandler>),
    Blocking(Arc<dyn BlockingMethodHandler>),
}

impl Handler {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }
}

/// Method name to handler.
pub struct MethodRegistry {
    handlers: HashMap<String, Handler>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in method.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        register_all(&mut reg);
        reg
    }

    /// Later registrations replace earlier ones under the same name.
    pub fn register_async(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        self.insert(method, Handler::Async(Arc::new(handler)));
    }

    pub fn register_blocking(&mut self, method: &str, handler: impl BlockingMethodHandler + 'static) {
        self.insert(method, Handler::Blocking(Arc::new(handler)));
    }

    fn insert(&mut self, method: &str, handler: Handler) {
        if self.handlers.insert(method.to_owned(), handler).is_some() {
            warn!(method, "replaced existing method handler");
        }
    }

    pub fn get(&self, method: &str) -> Option<Handler> {
        self.handlers.get(method).cloned()
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Sorted method names.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn register_all(reg: &mut MethodRegistry) {
    reg.register_async("ping", basic::PingHandler);
    reg.register_async("hello", basic::HelloHandler);
    reg.register_async("echo", basic::EchoHandler);
    reg.register_blocking("sleep", basic::SleepHandler);
    reg.register_blocking("loop", basic::LoopHandler);

    reg.register_async("ai/completion", ai::CompletionHandler);

    reg.register_async("topics/subscribe", topics::SubscribeHandler);
    reg.register_async("topics/unsubscribe", topics::UnsubscribeHandler);
    reg.register_async("topics/publish", topics::PublishHandler);

    reg.register_async("tools/list", tools::ListToolsHandler);
    reg.register_blocking("tools/call", tools::CallToolHandler);
    reg.register_async("tools/discover", tools::DiscoverToolsHandler);
}

/// Deserialize params into a typed struct. Absent params read as `{}`.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::Arc;

    use switchyard_core::provider::CompletionProvider;
    use switchyard_llm::MockProvider;
    use switchyard_tools::mock::ScriptedRemoteClient;
    use switchyard_tools::ToolRegistry;

    use super::RpcContext;
    use crate::bus::MemoryBus;
    use crate::config::GatewayConfig;
    use crate::state::GatewayState;

    pub fn make_state_with(
        tools: ToolRegistry,
        provider: Arc<dyn CompletionProvider>,
    ) -> Arc<GatewayState> {
        Arc::new(GatewayState::new(
            GatewayConfig::default(),
            Arc::new(MemoryBus::new()),
            Arc::new(tools),
            provider,
        ))
    }

    pub fn make_state() -> Arc<GatewayState> {
        let tools = ToolRegistry::with_remote(Arc::new(ScriptedRemoteClient::new()));
        switchyard_tools::register_builtins(&tools).unwrap();
        make_state_with(tools, Arc::new(MockProvider::echo()))
    }

    /// Context for a freshly registered connection on `state`.
    pub fn context_for(state: &Arc<GatewayState>) -> (RpcContext, tokio::sync::mpsc::Receiver<String>) {
        let (connection_id, rx) = state.connections.register();
        (
            RpcContext {
                connection_id,
                state: Arc::clone(state),
            },
            rx,
        )
    }

    pub fn make_test_context() -> RpcContext {
        let state = make_state();
        let (ctx, rx) = context_for(&state);
        // Keep the queue open for the life of the test process.
        std::mem::forget(rx);
        ctx
    }
}
