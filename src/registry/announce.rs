//! Agent-side registry announcer.
//!
//! Re-posts the agent card to the configured registry on an interval so a
//! restarted registry rebuilds its directory without operator action.
//! Failed announcements back off exponentially with jitter, capped, and the
//! cadence resets on the next success.

use crate::types::AgentCard;
use crate::utils::toml_config::RegistryClientConfig;
use rand::Rng as _;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic announcer for one agent card.
pub struct RegistryAnnouncer {
    client: reqwest::Client,
    register_url: String,
    card: AgentCard,
    interval: Duration,
    max_backoff: Duration,
}

impl RegistryAnnouncer {
    /// Build an announcer, or `None` when no registry is configured.
    pub fn new(config: &RegistryClientConfig, card: AgentCard) -> Option<Self> {
        let base_url = config.base_url.as_ref()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Some(Self {
            client,
            register_url: format!("{}/agents/register", base_url.trim_end_matches('/')),
            card,
            interval: Duration::from_secs(config.announce_interval_secs.max(1)),
            max_backoff: Duration::from_secs(config.max_backoff_secs.max(1)),
        })
    }

    /// Announce on the configured cadence until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(registry = %self.register_url, "registry announcer started");
        let mut failures: u32 = 0;
        loop {
            let delay = if failures == 0 {
                self.interval
            } else {
                self.backoff(failures)
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    info!("registry announcer stopped");
                    return;
                }
            }

            match self.announce_once().await {
                Ok(()) => {
                    if failures > 0 {
                        info!(agent = %self.card.id, "registry announcement recovered");
                    }
                    failures = 0;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(failures, "registry announcement failed: {e}");
                }
            }
        }
    }

    /// One announcement. Exposed for tests and for an eager announce at
    /// startup.
    pub async fn announce_once(&self) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.register_url)
            .json(&self.card)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("registry returned {status}");
        }
        debug!(agent = %self.card.id, "announced to registry");
        Ok(())
    }

    /// Exponential backoff with up to 20% jitter, capped.
    fn backoff(&self, failures: u32) -> Duration {
        let base = self
            .interval
            .saturating_mul(2u32.saturating_pow(failures.min(6)))
            .min(self.max_backoff);
        let jitter = rand::rng().random_range(0.0..0.2);
        base.mul_f64(1.0 + jitter).min(self.max_backoff)
    }
}
