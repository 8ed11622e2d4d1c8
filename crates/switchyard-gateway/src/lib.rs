//! WebSocket JSON-RPC gateway with topic pub/sub over a shared message bus.

pub mod bridge;
pub mod bus;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod handlers;
pub mod pool;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod topics;

pub use config::{BusKind, GatewayConfig};
pub use server::{build_router, start, ServerHandle};
pub use state::GatewayState;
