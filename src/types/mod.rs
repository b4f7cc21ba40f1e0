//! Core domain and wire types shared across the gateway, runtime, registry
//! and bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ============= Agent Card =============

/// Provider metadata attached to an [`AgentCard`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentProvider {
    /// Organization operating the agent.
    pub organization: String,
    /// Contact or documentation URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Capability flags advertised by an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    /// Supports `tasks/sendSubscribe` server-push streaming.
    pub streaming: bool,
    /// Supports push notification callbacks.
    pub push_notifications: bool,
    /// Tasks record an ordered history of status transitions.
    pub state_transition_history: bool,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            streaming: true,
            push_notifications: false,
            state_transition_history: true,
        }
    }
}

/// Self-describing metadata document for an agent, served at
/// `/.well-known/agent.json` and cached by the discovery registry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Unique agent identifier.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// What this agent does.
    pub description: String,
    /// Agent software version.
    pub version: String,
    /// Base URL where the agent's gateway listens.
    pub url: String,
    /// Provider metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<AgentProvider>,
    /// Capability flags.
    pub capabilities: AgentCapabilities,
    /// Skills currently held by the agent's skill registry.
    pub skills: Vec<SkillDescriptor>,
    /// Task protocol version this agent speaks.
    pub protocol_version: String,
}

/// Declared shape of a skill: identity, description, input/output schemas
/// and example inputs. Never mutated after registration; a changed skill is
/// an unregister followed by a register.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SkillDescriptor {
    /// Skill id, unique within its owning agent.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the skill does.
    pub description: String,
    /// JSON schema describing accepted input.
    pub input_schema: Value,
    /// JSON schema describing produced output.
    pub output_schema: Value,
    /// Example inputs.
    #[serde(default)]
    pub examples: Vec<Value>,
    /// Free-form tags for discovery.
    #[serde(default)]
    pub tags: Vec<String>,
}

// ============= Task Lifecycle =============

/// Task lifecycle states.
///
/// The graph is `submitted -> working -> {completed, failed, canceled}`,
/// with `canceled` also reachable directly from `submitted`. The three
/// right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker.
    Submitted,
    /// A worker is executing the skill handler.
    Working,
    /// Finished successfully; output is present.
    Completed,
    /// Finished with an error; error is present.
    Failed,
    /// Stopped before or during execution at the handler's checkpoint.
    Canceled,
}

impl TaskStatus {
    /// Whether no edges leave this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Whether `self -> next` is a valid edge in the lifecycle graph.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Submitted, Working)
                | (Submitted, Canceled)
                | (Working, Completed)
                | (Working, Failed)
                | (Working, Canceled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Machine-readable classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Malformed request or parameters.
    Validation,
    /// Unknown skill id.
    SkillNotFound,
    /// The skill handler returned an error.
    SkillFailed,
    /// The hard per-task timeout fired.
    TaskTimeout,
    /// An outbound tool call failed, possibly with the circuit open.
    ToolCall,
    /// Task was stopped at a cooperative checkpoint.
    Canceled,
}

/// Structured error carried by a task in the `failed` state. Polling and
/// streaming expose this same shape.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskError {
    /// Error classification.
    pub kind: TaskErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl TaskError {
    /// Build an error from a kind and message.
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One committed status transition, recorded in task history when the
/// `stateTransitionHistory` capability is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusChange {
    /// Status entered.
    pub status: TaskStatus,
    /// When the transition committed.
    pub at: DateTime<Utc>,
}

/// One request to execute a skill, tracked through the lifecycle state
/// machine. Owned by the runtime that created it for its entire lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Globally unique task id.
    pub id: String,
    /// Owning agent.
    pub agent_id: String,
    /// Skill this task executes.
    pub skill_id: String,
    /// Input payload handed to the skill handler.
    pub input: Value,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Output payload; present only in `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Structured error; present only in `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last committed transition.
    pub updated_at: DateTime<Utc>,
    /// Ordered transition history (empty when the capability is disabled).
    #[serde(default)]
    pub history: Vec<StatusChange>,
    /// Set once cancellation has been requested.
    #[serde(default)]
    pub cancel_requested: bool,
}

// ============= Error Types =============

/// Application-level errors surfaced by the gateway, runtime, registry and
/// bridge. Protocol adapters translate these into HTTP statuses and
/// JSON-RPC error codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed request or parameters, rejected before the runtime.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown skill id.
    #[error("Skill not found: {0}")]
    SkillNotFound(String),

    /// Unknown task id on get/cancel.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Attempted illegal lifecycle transition.
    #[error("Task conflict: {0}")]
    TaskConflict(String),

    /// Hard per-task timeout fired.
    #[error("Task timed out: {0}")]
    TaskTimeout(String),

    /// Submission rejected because the task queue is at its depth limit.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Missing or invalid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller exceeded its request budget.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Agent unreachable or classified unreachable by discovery.
    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    /// Unknown agent id in the directory.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Outbound tool call failed, possibly with the circuit open.
    #[error("Tool call failed: {0}")]
    ToolCall(String),

    /// Agent could not reach the discovery registry.
    #[error("Registry unreachable: {0}")]
    RegistryUnreachable(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::SkillNotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::TaskNotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::TaskConflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::TaskTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            AppError::Capacity(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            AppError::AgentUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::AgentNotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ToolCall(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::RegistryUnreachable(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppError>;
