use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use super::{parse_params, MethodHandler, RpcContext};
use crate::bridge::{self, PublishError};
use crate::rpc::{ErrorCode, RpcError};
use crate::topics::TopicError;

#[derive(Deserialize)]
struct TopicParams {
    topic: String,
}

#[derive(Deserialize)]
struct PublishParams {
    topic: String,
    #[serde(default)]
    message: Value,
}

fn topic_error(e: TopicError) -> RpcError {
    RpcError::invalid_params(e.to_string())
}

pub struct SubscribeHandler;

#[async_trait]
impl MethodHandler for SubscribeHandler {
    #[instrument(skip_all, fields(method = "topics/subscribe", conn_id = %ctx.connection_id))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let p: TopicParams = parse_params(params)?;
        let (topic, _) = ctx
            .state
            .topics
            .subscribe(&p.topic, &ctx.connection_id)
            .map_err(topic_error)?;
        Ok(json!({"ok": true, "subscribed": topic}))
    }
}

pub struct UnsubscribeHandler;

#[async_trait]
impl MethodHandler for UnsubscribeHandler {
    #[instrument(skip_all, fields(method = "topics/unsubscribe", conn_id = %ctx.connection_id))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let p: TopicParams = parse_params(params)?;
        let (topic, _) = ctx
            .state
            .topics
            .unsubscribe(&p.topic, &ctx.connection_id)
            .map_err(topic_error)?;
        Ok(json!({"ok": true, "unsubscribed": topic}))
    }
}

/// Publishes through the bus only; local subscribers are reached by the relay.
pub struct PublishHandler;

#[async_trait]
impl MethodHandler for PublishHandler {
    #[instrument(skip_all, fields(method = "topics/publish", conn_id = %ctx.connection_id))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let p: PublishParams = parse_params(params)?;
        match bridge::publish(ctx.state.bus.as_ref(), &p.topic, &p.message).await {
            Ok(topic) => Ok(json!({"ok": true, "published": topic})),
            Err(PublishError::Topic(e)) => Err(topic_error(e)),
            Err(PublishError::Bus(e)) => {
                warn!(error = %e, "bus publish failed");
                Err(RpcError::new(ErrorCode::TransportError, e.to_string()))
            }
        }
    }
}
