use async_trait::async_trait;
use serde_json::Value;

use switchyard_core::tools::ToolError;

use super::str_arg;
use crate::registry::LocalHandler;

pub struct Echo;

#[async_trait]
impl LocalHandler for Echo {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let message = str_arg(&args, "message")?;
        Ok(Value::String(format!("Echo: {message}")))
    }
}

pub struct ReverseString;

#[async_trait]
impl LocalHandler for ReverseString {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let text = str_arg(&args, "text")?;
        Ok(Value::String(text.chars().rev().collect()))
    }
}

pub struct Greet;

#[async_trait]
impl LocalHandler for Greet {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let name = str_arg(&args, "name")?;
        Ok(Value::String(format!("Hello, {name}!")))
    }
}
