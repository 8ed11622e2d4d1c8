use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Number, Value};
use tracing::debug;

use super::{parse_params, BlockingMethodHandler, MethodHandler, RpcContext};
use crate::rpc::RpcError;

pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!("pong"))
    }
}

pub struct HelloHandler;

#[async_trait]
impl MethodHandler for HelloHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!("hello"))
    }
}

/// Returns params unchanged, `null` when absent.
pub struct EchoHandler;

#[async_trait]
impl MethodHandler for EchoHandler {
    async fn handle(&self, params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(params.unwrap_or(Value::Null))
    }
}

fn seconds(n: &Number, field: &str) -> Result<Duration, RpcError> {
    n.as_f64()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| RpcError::invalid_params(format!("{field} must be a non-negative number")))
}

fn default_timeout() -> Number {
    Number::from(5)
}

#[derive(Deserialize)]
struct SleepParams {
    #[serde(default = "default_timeout")]
    timeout: Number,
}

/// Simulated long-running work.
pub struct SleepHandler;

impl BlockingMethodHandler for SleepHandler {
    fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let p: SleepParams = parse_params(params)?;
        let dur = seconds(&p.timeout, "timeout")?;
        debug!(conn_id = %ctx.connection_id, secs = dur.as_secs_f64(), "sleep");
        std::thread::sleep(dur);
        Ok(json!({"status": "completed", "slept_for": p.timeout}))
    }
}

fn default_count() -> u64 {
    5
}

fn default_interval() -> Number {
    Number::from(1)
}

#[derive(Deserialize)]
struct LoopParams {
    #[serde(default = "default_count")]
    count: u64,
    #[serde(default = "default_interval")]
    interval: Number,
}

pub struct LoopHandler;

impl BlockingMethodHandler for LoopHandler {
    fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let p: LoopParams = parse_params(params)?;
        let step = seconds(&p.interval, "interval")?;
        for i in 0..p.count {
            debug!(conn_id = %ctx.connection_id, iteration = i + 1, of = p.count, "loop");
            std::thread::sleep(step);
        }
        Ok(json!({"status": "completed", "loops": p.count, "interval": p.interval}))
    }
}
