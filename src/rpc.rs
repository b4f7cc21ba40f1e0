//! JSON-RPC 2.0 envelope for the task protocol.
//!
//! The gateway exposes exactly four wire methods: `tasks/send`, `tasks/get`,
//! `tasks/cancel` and `tasks/sendSubscribe`. This module owns the envelope
//! shapes, the error-code table and the per-method param/result structs; the
//! dispatch itself lives in `api::handlers::rpc`.

use crate::types::{AppError, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// `tasks/send` wire method.
pub const METHOD_SEND: &str = "tasks/send";
/// `tasks/get` wire method.
pub const METHOD_GET: &str = "tasks/get";
/// `tasks/cancel` wire method.
pub const METHOD_CANCEL: &str = "tasks/cancel";
/// `tasks/sendSubscribe` wire method.
pub const METHOD_SEND_SUBSCRIBE: &str = "tasks/sendSubscribe";

// ============= Envelope =============

/// Incoming JSON-RPC request envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JsonRpcRequest {
    /// Protocol marker, must be `"2.0"`.
    pub jsonrpc: String,
    /// Wire method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
    /// Caller-chosen correlation id.
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    /// Validate the envelope itself (not the params).
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.jsonrpc != "2.0" {
            return Err(RpcError::invalid_request(format!(
                "unsupported jsonrpc version: {:?}",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(RpcError::invalid_request("missing method"));
        }
        Ok(())
    }
}

/// Outgoing JSON-RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JsonRpcResponse {
    /// Protocol marker, always `"2.0"`.
    pub jsonrpc: String,
    /// Result payload; absent on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Correlation id echoed from the request.
    pub id: Value,
}

impl JsonRpcResponse {
    /// Successful response carrying `result`.
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Error response carrying `error`.
    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

// ============= Errors =============

/// JSON-RPC parse error.
pub const CODE_PARSE_ERROR: i64 = -32700;
/// JSON-RPC invalid request.
pub const CODE_INVALID_REQUEST: i64 = -32600;
/// JSON-RPC method not found.
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC invalid params.
pub const CODE_INVALID_PARAMS: i64 = -32602;
/// Generic server error.
pub const CODE_INTERNAL: i64 = -32000;
/// Unknown skill id.
pub const CODE_SKILL_NOT_FOUND: i64 = -32001;
/// Unknown task id.
pub const CODE_TASK_NOT_FOUND: i64 = -32002;
/// Illegal lifecycle transition.
pub const CODE_TASK_CONFLICT: i64 = -32003;
/// Hard task timeout.
pub const CODE_TASK_TIMEOUT: i64 = -32004;
/// Queue depth limit reached.
pub const CODE_CAPACITY: i64 = -32005;
/// Caller exceeded its request budget.
pub const CODE_RATE_LIMITED: i64 = -32007;
/// Agent unavailable.
pub const CODE_AGENT_UNAVAILABLE: i64 = -32008;
/// Outbound tool call failed.
pub const CODE_TOOL_CALL: i64 = -32009;

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error with a code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Invalid-request envelope error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(CODE_INVALID_REQUEST, message)
    }

    /// Invalid-params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(CODE_INVALID_PARAMS, message)
    }

    /// Method-not-found error.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(CODE_METHOD_NOT_FOUND, format!("unknown method: {method}"))
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::Validation(_) => CODE_INVALID_PARAMS,
            AppError::SkillNotFound(_) => CODE_SKILL_NOT_FOUND,
            AppError::TaskNotFound(_) => CODE_TASK_NOT_FOUND,
            AppError::TaskConflict(_) => CODE_TASK_CONFLICT,
            AppError::TaskTimeout(_) => CODE_TASK_TIMEOUT,
            AppError::Capacity(_) => CODE_CAPACITY,
            AppError::RateLimited(_) => CODE_RATE_LIMITED,
            AppError::AgentUnavailable(_) => CODE_AGENT_UNAVAILABLE,
            AppError::ToolCall(_) => CODE_TOOL_CALL,
            _ => CODE_INTERNAL,
        };
        Self::new(code, err.to_string())
    }
}

// ============= Method Params/Results =============

/// Params for `tasks/send` and `tasks/sendSubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendTaskParams {
    /// Skill to execute.
    pub skill_id: String,
    /// Input payload handed to the skill handler.
    #[serde(default)]
    pub input: Value,
    /// Caller-generated task id; the server generates one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Result of `tasks/send`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendTaskResult {
    /// Accepted task id.
    pub task_id: String,
    /// Status at acceptance time.
    pub status: TaskStatus,
}

/// Params for `tasks/get`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GetTaskParams {
    /// Task to fetch.
    pub task_id: String,
}

/// Params for `tasks/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelTaskParams {
    /// Task to cancel.
    pub task_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_roundtrip() {
        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "tasks/send",
            "params": {"skill_id": "echo", "input": {"text": "hi"}},
            "id": 1
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.method, METHOD_SEND);

        let params: SendTaskParams = serde_json::from_value(req.params).unwrap();
        assert_eq!(params.skill_id, "echo");
        assert!(params.task_id.is_none());
    }

    #[test]
    fn rejects_wrong_version() {
        let req = JsonRpcRequest {
            jsonrpc: "1.0".into(),
            method: METHOD_GET.into(),
            params: Value::Null,
            id: json!(7),
        };
        let err = req.validate().unwrap_err();
        assert_eq!(err.code, CODE_INVALID_REQUEST);
    }

    #[test]
    fn app_errors_map_to_codes() {
        let err: RpcError = AppError::SkillNotFound("nope".into()).into();
        assert_eq!(err.code, CODE_SKILL_NOT_FOUND);
        let err: RpcError = AppError::TaskConflict("bad edge".into()).into();
        assert_eq!(err.code, CODE_TASK_CONFLICT);
        let err: RpcError = AppError::Validation("missing".into()).into();
        assert_eq!(err.code, CODE_INVALID_PARAMS);
    }

    #[test]
    fn error_response_shape() {
        let resp = JsonRpcResponse::err(json!(3), RpcError::method_not_found("tasks/resend"));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["error"]["code"], CODE_METHOD_NOT_FOUND);
        assert!(v.get("result").is_none());
    }
}
