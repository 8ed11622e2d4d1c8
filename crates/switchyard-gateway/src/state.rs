use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use switchyard_core::provider::CompletionProvider;
use switchyard_tools::ToolRegistry;

use crate::bridge::RelayConfig;
use crate::bus::MessageBus;
use crate::config::GatewayConfig;
use crate::connection::ConnectionManager;
use crate::handlers::MethodRegistry;
use crate::pool::WorkerPool;
use crate::topics::TopicRegistry;

/// Everything a request handler or HTTP route can reach.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub connections: Arc<ConnectionManager>,
    pub topics: Arc<TopicRegistry>,
    pub bus: Arc<dyn MessageBus>,
    pub tools: Arc<ToolRegistry>,
    pub provider: Arc<dyn CompletionProvider>,
    pub pool: WorkerPool,
    pub methods: Arc<MethodRegistry>,
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        bus: Arc<dyn MessageBus>,
        tools: Arc<ToolRegistry>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new(config.send_queue_size));
        let topics = Arc::new(TopicRegistry::new(Arc::clone(&connections)));
        let pool = WorkerPool::new(config.worker_threads);
        Self {
            config,
            connections,
            topics,
            bus,
            tools,
            provider,
            pool,
            methods: Arc::new(MethodRegistry::with_defaults()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_methods(mut self, methods: MethodRegistry) -> Self {
        self.methods = Arc::new(methods);
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            poll_interval: Duration::from_millis(self.config.bus_poll_interval_ms),
            backoff: Duration::from_millis(self.config.bus_reconnect_backoff_ms),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use switchyard_llm::MockProvider;

    #[test]
    fn builds_from_config() {
        let config = GatewayConfig {
            send_queue_size: 4,
            worker_threads: 3,
            bus_poll_interval_ms: 250,
            ..Default::default()
        };
        let state = GatewayState::new(
            config,
            Arc::new(MemoryBus::new()),
            Arc::new(ToolRegistry::new()),
            Arc::new(MockProvider::echo()),
        );
        assert_eq!(state.pool.size(), 3);
        assert!(state.methods.has_method("ping"));
        assert_eq!(state.relay_config().poll_interval, Duration::from_millis(250));
        assert_eq!(state.relay_config().pattern, "topic:*");
        assert!(!state.shutdown.is_cancelled());
    }

    #[test]
    fn custom_methods_and_token() {
        let token = CancellationToken::new();
        let state = GatewayState::new(
            GatewayConfig::default(),
            Arc::new(MemoryBus::new()),
            Arc::new(ToolRegistry::new()),
            Arc::new(MockProvider::echo()),
        )
        .with_methods(MethodRegistry::new())
        .with_shutdown(token.clone());
        assert!(state.methods.methods().is_empty());
        token.cancel();
        assert!(state.shutdown.is_cancelled());
    }
}
