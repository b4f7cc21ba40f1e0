//! MCP Bridge
//!
//! Two-way translation between the agent's skills and MCP tools.
//!
//! Inbound, [`mcp::bridge`](crate::mcp::bridge) mounts an MCP tool server
//! on the agent: every registered skill appears as a tool named
//! `<agent_id>.<skill_id>`, and `tools/call` runs the skill through the
//! regular task runtime, so bridged calls get the same queueing, timeout
//! and cancellation treatment as native JSON-RPC submissions.
//!
//! Outbound, [`mcp::client`](crate::mcp::client) calls tools on remote MCP
//! servers behind a per-backend circuit breaker
//! ([`mcp::breaker`](crate::mcp::breaker)).

/// Consecutive-failure circuit breaker.
pub mod breaker;
/// Inbound tool server over the skill registry.
pub mod bridge;
/// Outbound tool client.
pub mod client;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as advertised on the MCP wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Namespaced tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// One content block in a tool-call result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContent {
    /// Content kind; this bridge only produces `"text"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload.
    pub text: String,
}

impl ToolContent {
    /// Text content block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Result of a tool call on the MCP wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Content blocks.
    pub content: Vec<ToolContent>,
    /// Whether the tool itself reported failure.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Successful result carrying one text block.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    /// Failed result carrying the error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(message)],
            is_error: true,
        }
    }

    /// Concatenated text of all content blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
