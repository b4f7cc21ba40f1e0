//! Background health poller for the registry service.
//!
//! Each sweep probes every registered agent's `/health` endpoint
//! concurrently, so one hung agent cannot delay the others past its own
//! probe timeout. Outcomes feed the directory's consecutive-failure
//! classification; a sweep also prunes agents that never answered a probe
//! within their registration grace period.

use super::AgentDirectory;
use crate::utils::toml_config::DiscoveryConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodic health prober over a shared [`AgentDirectory`].
pub struct HealthPoller {
    directory: Arc<AgentDirectory>,
    client: reqwest::Client,
    interval: Duration,
    grace: chrono::Duration,
}

impl HealthPoller {
    /// Build a poller from the discovery configuration.
    pub fn new(directory: Arc<AgentDirectory>, config: &DiscoveryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.health_check_timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            directory,
            client,
            interval: Duration::from_secs(config.health_check_interval_secs),
            grace: chrono::Duration::seconds(config.registration_grace_secs as i64),
        }
    }

    /// Run sweeps until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "health poller started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                _ = shutdown.cancelled() => {
                    info!("health poller stopped");
                    return;
                }
            }
        }
    }

    /// One full sweep: probe every agent concurrently, then prune
    /// never-healthy registrations past their grace period.
    pub async fn sweep(&self) {
        let entries = self.directory.list(&Default::default());
        debug!(agents = entries.len(), "health sweep");

        let probes = entries.into_iter().map(|entry| {
            let client = self.client.clone();
            let directory = self.directory.clone();
            async move {
                let agent_id = entry.card.id;
                if probe(&client, &entry.card.url).await {
                    directory.record_success(&agent_id);
                } else {
                    directory.record_failure(&agent_id);
                }
            }
        });
        futures::future::join_all(probes).await;

        self.directory.prune_never_healthy(self.grace);
    }
}

/// Probe one agent. Any 2xx from its `/health` counts as alive; timeouts,
/// connection errors and non-2xx statuses all count as failures.
async fn probe(client: &reqwest::Client, base_url: &str) -> bool {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
