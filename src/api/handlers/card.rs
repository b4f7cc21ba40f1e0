//! Agent card and health handlers.

use crate::AppState;
use crate::types::{AgentCapabilities, AgentCard, AgentProvider};
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// Task protocol version advertised on the card.
pub const PROTOCOL_VERSION: &str = "0.2";

/// Build the agent card from the active configuration and skill registry.
pub fn build_agent_card(state: &AppState) -> AgentCard {
    let config = &state.config;
    AgentCard {
        id: config.agent.id.clone(),
        name: config.agent.name.clone(),
        description: config.agent.description.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        url: config.server.advertised_url(),
        provider: config.agent.organization.as_ref().map(|org| AgentProvider {
            organization: org.clone(),
            url: None,
        }),
        capabilities: AgentCapabilities {
            streaming: true,
            push_notifications: false,
            state_transition_history: state.runtime.record_history(),
        },
        skills: state.runtime.skills().descriptors(),
        protocol_version: PROTOCOL_VERSION.to_string(),
    }
}

/// `GET /.well-known/agent.json` - the agent card.
#[utoipa::path(
    get,
    path = "/.well-known/agent.json",
    responses(
        (status = 200, description = "The agent card", body = AgentCard)
    ),
    tag = "discovery"
)]
pub async fn agent_card(State(state): State<AppState>) -> Json<AgentCard> {
    Json(build_agent_card(&state))
}

/// `GET /health` - liveness plus task counters.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "agent": state.config.agent.id,
        "version": env!("CARGO_PKG_VERSION"),
        "tasks": state.runtime.task_count(),
        "skills": state.runtime.skills().skill_ids(),
    }))
}
