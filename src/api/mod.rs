//! HTTP Gateway
//!
//! The agent's HTTP surface, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # Endpoints
//!
//! ## Discovery (public)
//! - `GET /.well-known/agent.json` - The agent card
//! - `GET /health` - Liveness and task counters
//!
//! ## Task Protocol (`/rpc`, authenticated)
//! JSON-RPC 2.0 over POST, one request per call:
//! - `tasks/send` - Submit a task, returns the accepted id and status
//! - `tasks/get` - Fetch a task snapshot with status, output and history
//! - `tasks/cancel` - Request cancellation
//! - `tasks/sendSubscribe` - Submit and stream status updates over SSE
//!
//! ## MCP Bridge (`/mcp`, authenticated)
//! Skills exposed as MCP tools; see [`crate::mcp::bridge`].
//!
//! # Authentication
//!
//! `/rpc` and `/mcp` require a credential in the `Authorization` header:
//! ```text
//! Authorization: Bearer <token>
//! ```
//! (or `X-API-Key`). Verified callers are also subject to per-caller rate
//! limiting.

/// Request and response handlers for all endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
