//! Inbound MCP tool server over the skill registry.
//!
//! Mounts `POST /mcp` on the agent, behind the same auth and rate-limit
//! middleware as `/rpc`. Skills are advertised as tools named
//! `<agent_id>.<skill_id>`; a `tools/call` submits a regular task and
//! blocks until it reaches a terminal state, so bridged callers observe
//! the same queueing, timeout and cancellation semantics as JSON-RPC
//! clients. Tool-level failures are reported MCP-style with `isError`
//! rather than as protocol errors.

use super::{ToolCallResult, ToolDescriptor};
use crate::AppState;
use crate::rpc::{CODE_PARSE_ERROR, JsonRpcRequest, JsonRpcResponse, RpcError};
use crate::types::TaskStatus;
use axum::{Json, Router, extract::State, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Extra wait beyond the runtime's own task timeout, so the runtime's
/// timeout commit always wins over the bridge giving up.
const TERMINAL_WAIT_SLACK: Duration = Duration::from_secs(2);

/// Router fragment with the bridge endpoint.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/mcp", post(dispatch))
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// `POST /mcp` - MCP JSON-RPC dispatch.
async fn dispatch(State(state): State<AppState>, body: String) -> Json<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            return Json(JsonRpcResponse::err(
                Value::Null,
                RpcError::new(CODE_PARSE_ERROR, format!("parse error: {e}")),
            ));
        }
    };
    if let Err(error) = request.validate() {
        return Json(JsonRpcResponse::err(request.id.clone(), error));
    }

    debug!(method = %request.method, "mcp request");
    let id = request.id.clone();
    let outcome = match request.method.as_str() {
        "initialize" => Ok(initialize(&state)),
        "tools/list" => Ok(list_tools(&state)),
        "tools/call" => call_tool(&state, request.params).await,
        other => Err(RpcError::method_not_found(other)),
    };
    match outcome {
        Ok(result) => Json(JsonRpcResponse::ok(id, result)),
        Err(error) => Json(JsonRpcResponse::err(id, error)),
    }
}

fn initialize(state: &AppState) -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": {
            "name": state.config.agent.name,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": { "tools": {} },
    })
}

/// Advertise every registered skill as a namespaced tool.
fn list_tools(state: &AppState) -> Value {
    let agent_id = state.runtime.agent_id();
    let tools: Vec<ToolDescriptor> = state
        .runtime
        .skills()
        .descriptors()
        .into_iter()
        .map(|skill| ToolDescriptor {
            name: format!("{agent_id}.{}", skill.id),
            description: skill.description,
            input_schema: skill.input_schema,
        })
        .collect();
    json!({ "tools": tools })
}

async fn call_tool(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let params: ToolCallParams =
        serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))?;
    let skill_id = strip_namespace(state.runtime.agent_id(), &params.name)?;

    let task = state.runtime.submit(skill_id, params.arguments, None)?;
    let wait = state.runtime.task_timeout() + TERMINAL_WAIT_SLACK;
    let task = state.runtime.wait_for_terminal(&task.id, wait).await?;

    let result = match task.status {
        TaskStatus::Completed => {
            let output = task.output.unwrap_or(Value::Null);
            ToolCallResult::ok(serde_json::to_string(&output).unwrap_or_default())
        }
        TaskStatus::Canceled => ToolCallResult::error(format!("task {} canceled", task.id)),
        _ => {
            let message = task
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "task failed".to_string());
            ToolCallResult::error(message)
        }
    };
    Ok(serde_json::to_value(result).unwrap_or(Value::Null))
}

/// Resolve a tool name to a local skill id. Names carry the agent id as a
/// namespace; a bare skill id is accepted for single-agent callers.
fn strip_namespace<'a>(agent_id: &str, tool_name: &'a str) -> Result<&'a str, RpcError> {
    match tool_name.split_once('.') {
        Some((prefix, skill_id)) if prefix == agent_id => Ok(skill_id),
        Some((prefix, _)) => Err(RpcError::invalid_params(format!(
            "tool {tool_name} belongs to agent {prefix}, this agent is {agent_id}"
        ))),
        None => Ok(tool_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_resolution() {
        assert_eq!(strip_namespace("alpha", "alpha.echo").unwrap(), "echo");
        assert_eq!(strip_namespace("alpha", "echo").unwrap(), "echo");
        assert!(strip_namespace("alpha", "beta.echo").is_err());
    }
}
