//! Remote tools over the Model Context Protocol (stdio servers).

pub mod client;
pub mod config;
pub mod remote;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use config::{McpServerConfig, McpServersConfig};
pub use remote::McpRemoteClient;
