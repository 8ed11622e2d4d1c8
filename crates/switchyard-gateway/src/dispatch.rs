//! Turns one inbound text frame into at most one outbound frame.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::handlers::{Handler, RpcContext};
use crate::pool::PoolError;
use crate::rpc::{JsonRpcRequest, JsonRpcResponse, RpcError};

/// Process a frame. `None` means nothing is sent back.
pub async fn handle_frame(text: &str, ctx: &RpcContext) -> Option<String> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(conn_id = %ctx.connection_id, error = %e, "unparseable frame");
            let reply = JsonRpcResponse::error(Value::Null, &RpcError::parse_error(e.to_string()));
            return encode(&reply);
        }
    };

    match value {
        Value::Array(items) if items.is_empty() => {
            let reply = JsonRpcResponse::error(Value::Null, &RpcError::invalid_request("empty batch"));
            encode(&reply)
        }
        Value::Array(items) => {
            let mut replies = Vec::with_capacity(items.len());
            for item in items {
                if let Some(reply) = handle_message(item, ctx).await {
                    replies.push(reply);
                }
            }
            if replies.is_empty() {
                None
            } else {
                encode(&replies)
            }
        }
        single => {
            let reply = handle_message(single, ctx).await?;
            encode(&reply)
        }
    }
}

/// Validate and run one request. Invalid messages are always answered;
/// notifications never are.
pub async fn handle_message(value: Value, ctx: &RpcContext) -> Option<JsonRpcResponse> {
    let req = match JsonRpcRequest::from_value(value) {
        Ok(req) => req,
        Err(invalid) => {
            debug!(conn_id = %ctx.connection_id, error = %invalid.error, "invalid request");
            return Some(JsonRpcResponse::error(invalid.id, &invalid.error));
        }
    };

    let result = call(&req, ctx).await;
    let id = req.id?;
    Some(match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, &e),
    })
}

async fn call(req: &JsonRpcRequest, ctx: &RpcContext) -> Result<Value, RpcError> {
    let Some(handler) = ctx.state.methods.get(&req.method) else {
        debug!(conn_id = %ctx.connection_id, method = %req.method, "method not found");
        return Err(RpcError::method_not_found(&req.method));
    };
    let params = req.params.clone();

    let result = match handler {
        Handler::Async(h) => AssertUnwindSafe(h.handle(params, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(RpcError::from_panic(payload))),
        Handler::Blocking(h) => {
            let task_ctx = ctx.clone();
            match ctx.state.pool.run(move || h.handle(params, &task_ctx)).await {
                Ok(r) => r,
                Err(PoolError::Panicked(msg)) => Err(RpcError::exception(msg)),
                Err(e) => Err(RpcError::exception(e.to_string())),
            }
        }
    };

    if let Err(e) = &result {
        if e.data.as_ref().is_some_and(|d| d.get("exception").is_some()) {
            error!(conn_id = %ctx.connection_id, method = %req.method, error = %e, "handler crashed");
        } else {
            warn!(conn_id = %ctx.connection_id, method = %req.method, code = e.code.code(), error = %e, "handler error");
        }
    }
    result
}

fn encode<T: Serialize>(reply: &T) -> Option<String> {
    match serde_json::to_string(reply) {
        Ok(s) => Some(s),
        Err(e) => {
            error!(error = %e, "failed to encode reply");
            None
        }
    }
}
