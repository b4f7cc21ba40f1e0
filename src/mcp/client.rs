//! Outbound MCP tool client.
//!
//! Speaks the MCP tool surface (`tools/list`, `tools/call`) as JSON-RPC
//! over HTTP against one backend server. Every wire call is gated by a
//! per-backend [`CircuitBreaker`]; an open circuit fails fast with
//! [`AppError::ToolCall`] instead of waiting on a dead server, and
//! transport failures surface the same way so callers see one error kind
//! for an outbound call that did not produce a tool result.

use super::breaker::CircuitBreaker;
use super::{ToolCallResult, ToolDescriptor};
use crate::types::{AppError, Result};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Client for one MCP tool server.
pub struct McpToolClient {
    endpoint: String,
    client: reqwest::Client,
    breaker: CircuitBreaker,
    next_id: AtomicU64,
}

impl McpToolClient {
    /// Client for `endpoint` with breaker settings `threshold`/`cooldown`
    /// and a per-request timeout.
    pub fn new(
        endpoint: impl Into<String>,
        request_timeout: Duration,
        threshold: u32,
        cooldown: Duration,
    ) -> Self {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            breaker: CircuitBreaker::new(endpoint.clone(), threshold, cooldown),
            endpoint,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    /// The backend endpoint this client targets.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Breaker state, for diagnostics.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fetch the backend's tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let result = self.rpc("tools/list", json!({})).await?;
        let tools = result.get("tools").cloned().unwrap_or(Value::Null);
        serde_json::from_value(tools)
            .map_err(|e| AppError::ToolCall(format!("malformed tools/list reply: {e}")))
    }

    /// Invoke one tool. Backend-reported tool errors (`isError`) surface as
    /// [`AppError::ToolCall`] without tripping the breaker; only transport
    /// and protocol failures count against the circuit.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let result = self
            .rpc("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        let call: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| AppError::ToolCall(format!("malformed tools/call reply: {e}")))?;
        if call.is_error {
            return Err(AppError::ToolCall(format!(
                "tool {name} failed: {}",
                call.text()
            )));
        }
        Ok(call)
    }

    /// One JSON-RPC exchange under the breaker.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        self.breaker.check()?;
        match self.rpc_inner(method, params).await {
            Ok(result) => {
                self.breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    async fn rpc_inner(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(endpoint = %self.endpoint, method, id, "mcp request");
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ToolCall(format!("{}: {e}", self.endpoint)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ToolCall(format!(
                "{}: http {status}",
                self.endpoint
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| AppError::ToolCall(format!("unparseable mcp reply: {e}")))?;
        if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
            return Err(AppError::ToolCall(format!("mcp error: {error}")));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}
