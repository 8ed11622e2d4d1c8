use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use switchyard_core::errors::ProviderError;
use switchyard_core::provider::CompletionRequest;

use super::{parse_params, MethodHandler, RpcContext};
use crate::rpc::{ErrorCode, RpcError};

fn provider_error(e: &ProviderError) -> RpcError {
    let code = if e.is_fatal() {
        ErrorCode::InvalidParams
    } else if matches!(e, ProviderError::Timeout(_)) {
        ErrorCode::TimeoutError
    } else {
        ErrorCode::ServerError
    };
    RpcError::new(code, e.to_string()).with_data(json!({
        "kind": e.error_kind(),
        "retryable": e.is_retryable(),
    }))
}

/// `ai/completion`: passes the request to the completion provider and
/// returns `{model, text, raw}`.
pub struct CompletionHandler;

#[async_trait]
impl MethodHandler for CompletionHandler {
    #[instrument(skip_all, fields(method = "ai/completion", conn_id = %ctx.connection_id))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let req: CompletionRequest = parse_params(params)?;
        let completion = ctx
            .state
            .provider
            .generate_completion(&req.prompt, req.model.as_deref(), &req.options)
            .await
            .map_err(|e| {
                warn!(error = %e, kind = e.error_kind(), "completion failed");
                provider_error(&e)
            })?;
        serde_json::to_value(completion).map_err(|e| RpcError::internal(e.to_string()))
    }
}
