//! Agent Discovery Registry
//!
//! The directory behind the standalone `atlas-registry` service. Agents
//! register their cards here, a background poller probes their health
//! endpoints, and callers browse the directory filtered by skill, tag or
//! health.
//!
//! # Module Structure
//!
//! - [`registry::api`](crate::registry::api) - HTTP surface of the registry service
//! - [`registry::health`](crate::registry::health) - Background health poller
//! - [`registry::announce`](crate::registry::announce) - Agent-side announcer

/// Agent-side periodic announcements to a registry.
pub mod announce;
/// HTTP handlers and router for the registry service.
pub mod api;
/// Background health poller.
pub mod health;

use crate::types::{AgentCard, AppError, Result, SkillDescriptor};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{info, warn};

/// Floor on the probe-window length; the window always holds at least the
/// failure threshold so the unreachable classification can be read off it.
const MIN_WINDOW: usize = 8;

// ============= Health Classification =============

/// Directory health classification of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Last probe succeeded.
    Healthy,
    /// At least one probe failed, but fewer than the failure threshold.
    Degraded,
    /// The failure threshold of consecutive probes has been reached.
    Unreachable,
    /// Never probed.
    Unknown,
}

/// Probe bookkeeping for one registered agent.
///
/// The source of truth is `window`, a bounded history of recent probe
/// outcomes; `state` and `consecutive_failures` are derived from it on
/// every update so the classification is a pure function of the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Current classification, derived from the window.
    pub state: HealthState,
    /// Trailing failed probes since the last success, derived from the
    /// window.
    pub consecutive_failures: u32,
    /// Recent probe outcomes, oldest first (`true` = success).
    pub window: VecDeque<bool>,
    /// When the agent registered (or last re-registered).
    pub registered_at: DateTime<Utc>,
    /// Last probe of any outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    /// Last successful probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_healthy: Option<DateTime<Utc>>,
}

impl HealthRecord {
    fn new() -> Self {
        Self {
            state: HealthState::Unknown,
            consecutive_failures: 0,
            window: VecDeque::new(),
            registered_at: Utc::now(),
            last_checked: None,
            last_healthy: None,
        }
    }

    /// Record one probe outcome and re-derive the classification.
    fn observe(&mut self, success: bool, capacity: usize, threshold: u32) {
        if self.window.len() >= capacity {
            self.window.pop_front();
        }
        self.window.push_back(success);

        let now = Utc::now();
        self.last_checked = Some(now);
        if success {
            self.last_healthy = Some(now);
        }
        self.consecutive_failures = trailing_failures(&self.window);
        self.state = classify(&self.window, threshold);
    }
}

fn trailing_failures(window: &VecDeque<bool>) -> u32 {
    window.iter().rev().take_while(|ok| !**ok).count() as u32
}

/// Pure classification over the probe window: the latest outcome decides
/// healthy vs failing, and a trailing failure run at the threshold makes
/// the agent unreachable.
fn classify(window: &VecDeque<bool>, threshold: u32) -> HealthState {
    match window.back() {
        None => HealthState::Unknown,
        Some(true) => HealthState::Healthy,
        Some(false) if trailing_failures(window) >= threshold => HealthState::Unreachable,
        Some(false) => HealthState::Degraded,
    }
}

// ============= Directory Entries =============

/// A registered agent: its advertised card plus health bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    /// The card the agent advertised at registration.
    pub card: AgentCard,
    /// Probe state.
    pub health: HealthRecord,
}

/// Filters for directory listings. Empty filters match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryFilter {
    /// Only agents advertising this skill id.
    pub skill_id: Option<String>,
    /// Only agents with a skill carrying this tag.
    pub tag: Option<String>,
    /// Only agents currently classified healthy.
    #[serde(default)]
    pub healthy_only: bool,
}

/// One skill in the deduplicated directory-wide skill listing, along with
/// the agents that advertise it.
#[derive(Debug, Clone, Serialize)]
pub struct SkillListing {
    /// The descriptor as advertised (first registration wins on conflicts).
    #[serde(flatten)]
    pub skill: SkillDescriptor,
    /// Ids of agents advertising this skill.
    pub agents: Vec<String>,
}

/// Aggregate directory counters, exposed on the registry's `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryStats {
    /// All registered agents.
    pub total_agents: usize,
    /// Agents whose last probe succeeded.
    pub healthy: usize,
    /// Agents with failures below the threshold.
    pub degraded: usize,
    /// Agents at or past the failure threshold.
    pub unreachable: usize,
    /// Agents never probed.
    pub unknown: usize,
    /// Distinct skill ids across all cards.
    pub total_skills: usize,
}

// ============= Directory =============

/// In-memory agent directory, keyed by agent id.
pub struct AgentDirectory {
    agents: RwLock<HashMap<String, AgentEntry>>,
    failure_threshold: u32,
    window_capacity: usize,
}

impl AgentDirectory {
    /// Create a directory that classifies agents unreachable after
    /// `failure_threshold` consecutive failed probes.
    pub fn new(failure_threshold: u32) -> Self {
        let failure_threshold = failure_threshold.max(1);
        Self {
            agents: RwLock::new(HashMap::new()),
            failure_threshold,
            window_capacity: (failure_threshold as usize).max(MIN_WINDOW),
        }
    }

    /// Register or re-register an agent. Re-registration replaces the card
    /// and refreshes the registration timestamp; probe history carries over
    /// so a flapping agent cannot launder its failure count.
    pub fn register(&self, card: AgentCard) -> Result<AgentEntry> {
        if card.id.is_empty() {
            return Err(AppError::Validation("agent card is missing an id".into()));
        }
        if card.url.is_empty() {
            return Err(AppError::Validation("agent card is missing a url".into()));
        }

        let mut agents = self.agents.write();
        let entry = agents
            .entry(card.id.clone())
            .and_modify(|existing| {
                existing.card = card.clone();
                existing.health.registered_at = Utc::now();
            })
            .or_insert_with(|| AgentEntry {
                card: card.clone(),
                health: HealthRecord::new(),
            });
        info!(agent = %card.id, url = %card.url, "agent registered");
        Ok(entry.clone())
    }

    /// Remove an agent from the directory.
    pub fn deregister(&self, agent_id: &str) -> Result<AgentEntry> {
        self.agents
            .write()
            .remove(agent_id)
            .inspect(|_| info!(agent = agent_id, "agent deregistered"))
            .ok_or_else(|| AppError::AgentNotFound(agent_id.to_string()))
    }

    /// Look up one agent.
    pub fn get(&self, agent_id: &str) -> Result<AgentEntry> {
        self.agents
            .read()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| AppError::AgentNotFound(agent_id.to_string()))
    }

    /// List agents matching the filter, sorted by id.
    pub fn list(&self, filter: &DirectoryFilter) -> Vec<AgentEntry> {
        let agents = self.agents.read();
        let mut entries: Vec<AgentEntry> = agents
            .values()
            .filter(|entry| {
                if filter.healthy_only && entry.health.state != HealthState::Healthy {
                    return false;
                }
                if let Some(skill_id) = &filter.skill_id {
                    if !entry.card.skills.iter().any(|s| &s.id == skill_id) {
                        return false;
                    }
                }
                if let Some(tag) = &filter.tag {
                    if !entry
                        .card
                        .skills
                        .iter()
                        .any(|s| s.tags.iter().any(|t| t == tag))
                    {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.card.id.cmp(&b.card.id));
        entries
    }

    /// Deduplicated skill catalog across every registered card, sorted by
    /// skill id, each with the agents that advertise it.
    pub fn skills(&self) -> Vec<SkillListing> {
        let agents = self.agents.read();
        let mut by_id: HashMap<String, SkillListing> = HashMap::new();
        for entry in agents.values() {
            for skill in &entry.card.skills {
                by_id
                    .entry(skill.id.clone())
                    .or_insert_with(|| SkillListing {
                        skill: skill.clone(),
                        agents: Vec::new(),
                    })
                    .agents
                    .push(entry.card.id.clone());
            }
        }
        let mut listings: Vec<SkillListing> = by_id.into_values().collect();
        for listing in &mut listings {
            listing.agents.sort();
        }
        listings.sort_by(|a, b| a.skill.id.cmp(&b.skill.id));
        listings
    }

    /// Record a successful probe. Resets the consecutive-failure count.
    pub fn record_success(&self, agent_id: &str) {
        if let Some(entry) = self.agents.write().get_mut(agent_id) {
            entry
                .health
                .observe(true, self.window_capacity, self.failure_threshold);
        }
    }

    /// Record a failed probe. The agent degrades on the first failure and
    /// becomes unreachable at the threshold; it keeps its directory entry
    /// either way.
    pub fn record_failure(&self, agent_id: &str) {
        if let Some(entry) = self.agents.write().get_mut(agent_id) {
            entry
                .health
                .observe(false, self.window_capacity, self.failure_threshold);
            warn!(
                agent = agent_id,
                failures = entry.health.consecutive_failures,
                state = ?entry.health.state,
                "health probe failed"
            );
        }
    }

    /// Drop agents that have never answered a probe and whose registration
    /// is older than `grace`. Returns the ids removed.
    pub fn prune_never_healthy(&self, grace: chrono::Duration) -> Vec<String> {
        let cutoff = Utc::now() - grace;
        let mut agents = self.agents.write();
        let stale: Vec<String> = agents
            .iter()
            .filter(|(_, entry)| {
                entry.health.last_healthy.is_none() && entry.health.registered_at < cutoff
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            agents.remove(id);
            warn!(agent = %id, "pruned never-healthy agent");
        }
        stale
    }

    /// Ids of all registered agents.
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Aggregate counters.
    pub fn stats(&self) -> DirectoryStats {
        let agents = self.agents.read();
        let mut stats = DirectoryStats {
            total_agents: agents.len(),
            healthy: 0,
            degraded: 0,
            unreachable: 0,
            unknown: 0,
            total_skills: 0,
        };
        let mut skill_ids = std::collections::HashSet::new();
        for entry in agents.values() {
            match entry.health.state {
                HealthState::Healthy => stats.healthy += 1,
                HealthState::Degraded => stats.degraded += 1,
                HealthState::Unreachable => stats.unreachable += 1,
                HealthState::Unknown => stats.unknown += 1,
            }
            for skill in &entry.card.skills {
                skill_ids.insert(skill.id.clone());
            }
        }
        stats.total_skills = skill_ids.len();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentCapabilities;
    use serde_json::json;

    fn card(id: &str, skills: &[(&str, &[&str])]) -> AgentCard {
        AgentCard {
            id: id.to_string(),
            name: format!("{id} agent"),
            description: "test agent".into(),
            version: "0.1.0".into(),
            url: format!("http://{id}.local:4500"),
            provider: None,
            capabilities: AgentCapabilities::default(),
            skills: skills
                .iter()
                .map(|(sid, tags)| SkillDescriptor {
                    id: sid.to_string(),
                    name: sid.to_string(),
                    description: String::new(),
                    input_schema: json!({"type": "object"}),
                    output_schema: json!({"type": "object"}),
                    examples: vec![],
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                })
                .collect(),
            protocol_version: "0.2".into(),
        }
    }

    #[test]
    fn register_and_get() {
        let dir = AgentDirectory::new(3);
        dir.register(card("alpha", &[("echo", &[])])).unwrap();

        let entry = dir.get("alpha").unwrap();
        assert_eq!(entry.health.state, HealthState::Unknown);
        assert!(dir.get("missing").is_err());
    }

    #[test]
    fn reregistration_replaces_card_but_keeps_probe_history() {
        let dir = AgentDirectory::new(3);
        dir.register(card("alpha", &[("echo", &[])])).unwrap();
        dir.record_failure("alpha");

        dir.register(card("alpha", &[("summarize", &[])])).unwrap();
        let entry = dir.get("alpha").unwrap();
        assert_eq!(entry.card.skills[0].id, "summarize");
        assert_eq!(entry.health.consecutive_failures, 1);
    }

    #[test]
    fn rejects_card_without_id() {
        let dir = AgentDirectory::new(3);
        let mut bad = card("alpha", &[]);
        bad.id.clear();
        assert!(dir.register(bad).is_err());
    }

    #[test]
    fn threshold_classification() {
        let dir = AgentDirectory::new(3);
        dir.register(card("alpha", &[])).unwrap();

        dir.record_failure("alpha");
        assert_eq!(dir.get("alpha").unwrap().health.state, HealthState::Degraded);
        dir.record_failure("alpha");
        assert_eq!(dir.get("alpha").unwrap().health.state, HealthState::Degraded);
        dir.record_failure("alpha");
        assert_eq!(
            dir.get("alpha").unwrap().health.state,
            HealthState::Unreachable
        );

        // One success resets the count entirely.
        dir.record_success("alpha");
        let entry = dir.get("alpha").unwrap();
        assert_eq!(entry.health.state, HealthState::Healthy);
        assert_eq!(entry.health.consecutive_failures, 0);
    }

    #[test]
    fn classification_derives_from_the_probe_window() {
        let dir = AgentDirectory::new(3);
        dir.register(card("alpha", &[])).unwrap();

        dir.record_success("alpha");
        dir.record_failure("alpha");
        dir.record_failure("alpha");

        let entry = dir.get("alpha").unwrap();
        assert_eq!(entry.health.window, VecDeque::from([true, false, false]));
        assert_eq!(entry.health.consecutive_failures, 2);
        assert_eq!(entry.health.state, HealthState::Degraded);

        // An older success past the trailing run does not soften the
        // classification once the run reaches the threshold.
        dir.record_failure("alpha");
        assert_eq!(
            dir.get("alpha").unwrap().health.state,
            HealthState::Unreachable
        );
    }

    #[test]
    fn probe_window_is_bounded() {
        let dir = AgentDirectory::new(3);
        dir.register(card("alpha", &[])).unwrap();

        for _ in 0..20 {
            dir.record_success("alpha");
        }
        let entry = dir.get("alpha").unwrap();
        assert!(entry.health.window.len() <= MIN_WINDOW);
        assert_eq!(entry.health.state, HealthState::Healthy);
    }

    #[test]
    fn unknown_agent_is_not_found() {
        let dir = AgentDirectory::new(3);
        assert!(matches!(
            dir.get("ghost"),
            Err(AppError::AgentNotFound(_))
        ));
        assert!(matches!(
            dir.deregister("ghost"),
            Err(AppError::AgentNotFound(_))
        ));
    }

    #[test]
    fn unreachable_agents_stay_listed() {
        let dir = AgentDirectory::new(1);
        dir.register(card("alpha", &[])).unwrap();
        dir.record_failure("alpha");

        assert_eq!(dir.list(&DirectoryFilter::default()).len(), 1);
        let healthy_only = DirectoryFilter {
            healthy_only: true,
            ..Default::default()
        };
        assert!(dir.list(&healthy_only).is_empty());
    }

    #[test]
    fn list_filters_by_skill_and_tag() {
        let dir = AgentDirectory::new(3);
        dir.register(card("alpha", &[("echo", &["diagnostic"])]))
            .unwrap();
        dir.register(card("beta", &[("summarize", &["nlp"])]))
            .unwrap();

        let by_skill = DirectoryFilter {
            skill_id: Some("echo".into()),
            ..Default::default()
        };
        let found = dir.list(&by_skill);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].card.id, "alpha");

        let by_tag = DirectoryFilter {
            tag: Some("nlp".into()),
            ..Default::default()
        };
        let found = dir.list(&by_tag);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].card.id, "beta");
    }

    #[test]
    fn skill_catalog_deduplicates_across_agents() {
        let dir = AgentDirectory::new(3);
        dir.register(card("alpha", &[("echo", &[])])).unwrap();
        dir.register(card("beta", &[("echo", &[]), ("summarize", &[])]))
            .unwrap();

        let listings = dir.skills();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].skill.id, "echo");
        assert_eq!(listings[0].agents, vec!["alpha", "beta"]);
        assert_eq!(listings[1].skill.id, "summarize");
        assert_eq!(listings[1].agents, vec!["beta"]);
    }

    #[test]
    fn prune_drops_only_never_healthy_agents() {
        let dir = AgentDirectory::new(3);
        dir.register(card("alpha", &[])).unwrap();
        dir.register(card("beta", &[])).unwrap();
        dir.record_success("beta");
        // Beta later goes dark, but it was healthy once.
        dir.record_failure("beta");

        let pruned = dir.prune_never_healthy(chrono::Duration::seconds(-1));
        assert_eq!(pruned, vec!["alpha"]);
        assert!(dir.get("alpha").is_err());
        assert!(dir.get("beta").is_ok());
    }

    #[test]
    fn stats_count_by_state() {
        let dir = AgentDirectory::new(2);
        dir.register(card("a", &[("echo", &[])])).unwrap();
        dir.register(card("b", &[("echo", &[])])).unwrap();
        dir.register(card("c", &[("summarize", &[])])).unwrap();
        dir.record_success("a");
        dir.record_failure("b");
        dir.record_failure("c");
        dir.record_failure("c");

        let stats = dir.stats();
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.healthy, 1);
        assert_eq!(stats.degraded, 1);
        assert_eq!(stats.unreachable, 1);
        assert_eq!(stats.total_skills, 2);
    }
}
