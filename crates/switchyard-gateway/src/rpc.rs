//! JSON-RPC 2.0 wire types and request validation.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes understood by the gateway. Anything in -32000..-32099 is
/// implementation defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError,
    ServerOverload,
    RateLimitExceeded,
    SessionExpired,
    MethodNotReady,
    InvalidBatchRequest,
    ContentTypeError,
    TransportError,
    TimeoutError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 14] = [
        Self::ParseError,
        Self::InvalidRequest,
        Self::MethodNotFound,
        Self::InvalidParams,
        Self::InternalError,
        Self::ServerError,
        Self::ServerOverload,
        Self::RateLimitExceeded,
        Self::SessionExpired,
        Self::MethodNotReady,
        Self::InvalidBatchRequest,
        Self::ContentTypeError,
        Self::TransportError,
        Self::TimeoutError,
    ];

    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError => -32000,
            Self::ServerOverload => -32001,
            Self::RateLimitExceeded => -32002,
            Self::SessionExpired => -32003,
            Self::MethodNotReady => -32004,
            Self::InvalidBatchRequest => -32040,
            Self::ContentTypeError => -32050,
            Self::TransportError => -32060,
            Self::TimeoutError => -32070,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError => "Server error",
            Self::ServerOverload => "Server overload",
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::SessionExpired => "Session expired",
            Self::MethodNotReady => "Method not ready",
            Self::InvalidBatchRequest => "Invalid batch request",
            Self::ContentTypeError => "Content-Type error",
            Self::TransportError => "Transport error",
            Self::TimeoutError => "Timeout error",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// Error returned by method handlers.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, ErrorCode::ParseError.message())
            .with_data(json!({"detail": detail.into()}))
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, detail)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Method not found: {method}"))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, detail)
    }

    /// An `InternalError` carrying `{"exception": <text>}`.
    pub fn exception(text: impl Into<String>) -> Self {
        Self::internal(ErrorCode::InternalError.message())
            .with_data(json!({"exception": text.into()}))
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::exception(panic_message(payload.as_ref()))
    }

    pub fn to_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code.code(),
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Exactly one of `result` or `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: Value, error: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            outcome: Outcome::Error(error.to_object()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

/// A validated request. `id: None` marks a notification.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonRpcRequest {
    pub method: String,
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// A message that failed validation, with the id its reply must carry.
#[derive(Debug)]
pub struct InvalidMessage {
    pub id: Value,
    pub error: RpcError,
}

fn valid_id(id: &Value) -> bool {
    matches!(id, Value::String(_) | Value::Number(_) | Value::Null)
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validate one decoded message. `"params": null` is treated as absent.
    pub fn from_value(value: Value) -> Result<Self, InvalidMessage> {
        let Value::Object(mut obj) = value else {
            return Err(InvalidMessage {
                id: Value::Null,
                error: RpcError::invalid_request("request must be an object"),
            });
        };

        let id = obj.remove("id");
        let reply_id = match &id {
            Some(v) if valid_id(v) => v.clone(),
            _ => Value::Null,
        };
        let fail = |msg: &str| InvalidMessage {
            id: reply_id.clone(),
            error: RpcError::invalid_request(msg),
        };

        if id.as_ref().is_some_and(|v| !valid_id(v)) {
            return Err(fail("id must be a string, number or null"));
        }
        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(fail("jsonrpc must be \"2.0\""));
        }
        let method = match obj.remove("method") {
            Some(Value::String(m)) if !m.is_empty() => m,
            _ => return Err(fail("method must be a non-empty string")),
        };
        let params = match obj.remove("params") {
            None | Some(Value::Null) => None,
            Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p),
            Some(_) => return Err(fail("params must be an object or an array")),
        };

        Ok(Self { method, params, id })
    }
}
