//! # A.T.L.A.S - Agent Task Lifecycle and Skill Orchestration
//!
//! A multi-agent task orchestration layer: agents advertise typed skills on
//! a discovery registry, accept work over a JSON-RPC task protocol with SSE
//! streaming, run it on a bounded worker pool with cooperative cancellation
//! and hard timeouts, and bridge skills to MCP tools in both directions.
//!
//! ## Overview
//!
//! A.T.L.A.S can be used in two ways:
//!
//! 1. **As standalone services** - Run the `atlas-agent` and
//!    `atlas-registry` binaries
//! 2. **As a library** - Import the runtime, store and registry components
//!    into your own Rust project
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use atlas::{AgentRuntime, RuntimeConfig, SkillRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let skills = Arc::new(SkillRegistry::with_builtin_skills());
//!     let runtime = AgentRuntime::start(RuntimeConfig::default(), skills);
//!
//!     let task = runtime.submit("echo", serde_json::json!({"text": "hi"}), None)?;
//!     let done = runtime
//!         .wait_for_terminal(&task.id, std::time::Duration::from_secs(5))
//!         .await?;
//!     println!("{:?}", done.status);
//!     Ok(())
//! }
//! ```
//!
//! ### Custom Skills
//!
//! ```rust,ignore
//! use atlas::skills::{Skill, SkillContext, SkillRegistry};
//! use std::sync::Arc;
//!
//! let registry = SkillRegistry::new();
//! registry.register(Arc::new(MySkill));
//! ```
//!
//! ## Modules
//!
//! - [`api`] - JSON-RPC gateway, agent card and SSE streaming
//! - [`auth`] - Token verification and per-caller rate limiting
//! - [`mcp`] - Skill/tool bridge with circuit-broken outbound calls
//! - [`registry`] - Discovery registry, health poller and announcer
//! - [`runtime`] - Worker pool, cancellation and timeouts
//! - [`skills`] - The `Skill` trait and registry
//! - [`store`] - Task records and the lifecycle state machine
//! - [`types`] - Common types and error handling

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP gateway: JSON-RPC dispatch, SSE streaming, agent card.
pub mod api;
/// Token verification and per-caller rate limiting.
pub mod auth;
/// MCP bridge: skills as tools, tools as skills.
pub mod mcp;
/// JSON-RPC envelope and task-protocol method types.
pub mod rpc;
/// Discovery registry service and agent-side announcer.
pub mod registry;
/// Worker pool, cooperative cancellation, timeouts, task events.
pub mod runtime;
/// The `Skill` trait, skill registry, and built-in skills.
pub mod skills;
/// Task records and the lifecycle state machine.
pub mod store;
/// Core types (cards, tasks, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use registry::{AgentDirectory, HealthState};
pub use runtime::{AgentRuntime, RuntimeConfig};
pub use skills::{Skill, SkillContext, SkillRegistry};
pub use store::TaskStore;
pub use types::{AgentCard, AppError, Result, Task, TaskStatus};
pub use utils::toml_config::{AtlasConfig, ConfigManager};

use std::sync::Arc;

/// Application state shared across gateway handlers.
#[derive(Clone)]
pub struct AppState {
    /// Active configuration snapshot.
    pub config: Arc<AtlasConfig>,
    /// Task runtime backing this agent.
    pub runtime: Arc<AgentRuntime>,
}
