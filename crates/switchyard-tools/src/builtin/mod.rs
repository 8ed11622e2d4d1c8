//! In-process tools registered at startup.

mod fs;
mod shell;
mod text;

use std::sync::Arc;

use serde_json::Value;

use switchyard_core::tools::{ParamSpec, ParamType, ToolError};

use crate::registry::{LocalHandler, ToolRegistry};

pub use fs::{FileExists, FileRead, FileWrite};
pub use shell::ExecuteCommand;
pub use text::{Echo, Greet, ReverseString};

struct Builtin {
    name: &'static str,
    description: &'static str,
    params: &'static [(&'static str, ParamType)],
    handler: Arc<dyn LocalHandler>,
}

fn catalogue() -> Vec<Builtin> {
    use ParamType::String as S;
    vec![
        Builtin {
            name: "echo",
            description: "A simple echo function that returns the input message.",
            params: &[("message", S)],
            handler: Arc::new(Echo),
        },
        Builtin {
            name: "reverse_string",
            description: "Reverse the input string.",
            params: &[("text", S)],
            handler: Arc::new(ReverseString),
        },
        Builtin {
            name: "greet",
            description: "Generate a greeting message for the given name.",
            params: &[("name", S)],
            handler: Arc::new(Greet),
        },
        Builtin {
            name: "file_exists",
            description: "Check if a file exists at the specified path.",
            params: &[("file_path", S)],
            handler: Arc::new(FileExists),
        },
        Builtin {
            name: "file_read",
            description: "Read and return the contents of a file.",
            params: &[("file_path", S)],
            handler: Arc::new(FileRead),
        },
        Builtin {
            name: "file_write",
            description: "Write the specified contents to a file.",
            params: &[("file_path", S), ("contents", S)],
            handler: Arc::new(FileWrite),
        },
        Builtin {
            name: "execute_command",
            description: "Execute a shell command and return its output.",
            params: &[("command", S)],
            handler: Arc::new(ExecuteCommand),
        },
        Builtin {
            name: "bash",
            description: "Alias for execute_command to run a bash command.",
            params: &[("command", S)],
            handler: Arc::new(ExecuteCommand),
        },
    ]
}

/// Register every built-in tool. Returns the registered names.
pub fn register_builtins(registry: &ToolRegistry) -> Result<Vec<String>, ToolError> {
    let mut names = Vec::new();
    for b in catalogue() {
        let params = b
            .params
            .iter()
            .map(|(name, ty)| ParamSpec::required(*name, *ty))
            .collect();
        registry.register_local(b.name, b.description, None, params, b.handler)?;
        names.push(b.name.to_string());
    }
    Ok(names)
}

pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} must be a string")))
}
