//! HTTP surface of the discovery registry service.
//!
//! # Endpoints
//!
//! - `POST /agents/register` - Register or refresh an agent card
//! - `GET /agents` - List agents (`skill_id`, `tag`, `healthy_only` filters)
//! - `GET /agents/{id}` - One agent with its health record
//! - `GET /agents/{id}/card` - Just the advertised card
//! - `DELETE /agents/{id}` - Deregister
//! - `GET /skills` - Deduplicated skill catalog with owning agents
//! - `GET /health` - Service liveness plus directory counters

use super::{AgentDirectory, AgentEntry, DirectoryFilter, SkillListing};
use crate::types::{AgentCard, Result};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// Build the registry service router.
pub fn create_router(directory: Arc<AgentDirectory>) -> Router {
    Router::new()
        .route("/agents/register", axum::routing::post(register_agent))
        .route("/agents", get(list_agents))
        .route("/agents/{id}", get(get_agent).delete(deregister_agent))
        .route("/agents/{id}/card", get(get_agent_card))
        .route("/skills", get(list_skills))
        .route("/health", get(health))
        .with_state(directory)
}

/// `POST /agents/register`
async fn register_agent(
    State(directory): State<Arc<AgentDirectory>>,
    Json(card): Json<AgentCard>,
) -> Result<Json<AgentEntry>> {
    Ok(Json(directory.register(card)?))
}

/// `GET /agents`
async fn list_agents(
    State(directory): State<Arc<AgentDirectory>>,
    Query(filter): Query<DirectoryFilter>,
) -> Json<Vec<AgentEntry>> {
    Json(directory.list(&filter))
}

/// `GET /agents/{id}`
async fn get_agent(
    State(directory): State<Arc<AgentDirectory>>,
    Path(id): Path<String>,
) -> Result<Json<AgentEntry>> {
    Ok(Json(directory.get(&id)?))
}

/// `GET /agents/{id}/card`
async fn get_agent_card(
    State(directory): State<Arc<AgentDirectory>>,
    Path(id): Path<String>,
) -> Result<Json<AgentCard>> {
    Ok(Json(directory.get(&id)?.card))
}

/// `DELETE /agents/{id}`
async fn deregister_agent(
    State(directory): State<Arc<AgentDirectory>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let entry = directory.deregister(&id)?;
    Ok(Json(json!({ "deregistered": entry.card.id })))
}

/// `GET /skills`
async fn list_skills(State(directory): State<Arc<AgentDirectory>>) -> Json<Vec<SkillListing>> {
    Json(directory.skills())
}

/// `GET /health`
async fn health(State(directory): State<Arc<AgentDirectory>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "directory": directory.stats(),
    }))
}
