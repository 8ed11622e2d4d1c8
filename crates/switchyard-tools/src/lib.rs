pub mod builtin;
pub mod mcp;
pub mod registry;
pub mod schema;

pub mod mock;

pub use builtin::register_builtins;
pub use registry::{handler_fn, LocalHandler, Tool, ToolKind, ToolRegistry};
