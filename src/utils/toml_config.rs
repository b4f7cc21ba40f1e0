//! TOML-based configuration for A.T.L.A.S.
//!
//! Declarative configuration for the agent, its runtime, the gateway's
//! auth/rate-limit surface, the registry announcer and the discovery
//! service, loaded from a TOML file (`atlas.toml`). Secrets are indirected
//! through environment variable names so the file itself stays free of
//! credentials.

use crate::types::{AppError, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Root configuration structure loaded from `atlas.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Gateway listener and logging.
    #[serde(default)]
    pub server: ServerConfig,
    /// Agent identity advertised on the card.
    #[serde(default)]
    pub agent: AgentIdentityConfig,
    /// Worker pool, queueing and timeout knobs.
    #[serde(default)]
    pub runtime: RuntimeSection,
    /// Credential verification and per-caller rate limiting.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Agent-side registry announcements.
    #[serde(default)]
    pub registry: RegistryClientConfig,
    /// Discovery registry service (the `atlas-registry` binary).
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// MCP bridge outbound circuit breaker.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

// ============= Server Configuration =============

/// Gateway listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log filter (tracing env-filter syntax).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Public base URL advertised on the agent card; derived from
    /// host/port when absent.
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    /// Public base URL for the agent card.
    pub fn advertised_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

// ============= Agent Identity =============

/// Identity advertised on the agent card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentityConfig {
    /// Unique agent id.
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// Display name.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Description shown in discovery listings.
    #[serde(default = "default_agent_description")]
    pub description: String,

    /// Operating organization, shown as provider metadata.
    #[serde(default)]
    pub organization: Option<String>,
}

fn default_agent_id() -> String {
    "atlas-agent".to_string()
}

fn default_agent_name() -> String {
    "Atlas Agent".to_string()
}

fn default_agent_description() -> String {
    "General-purpose task agent".to_string()
}

impl Default for AgentIdentityConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            name: default_agent_name(),
            description: default_agent_description(),
            organization: None,
        }
    }
}

// ============= Runtime =============

/// Worker pool, queueing and timeout knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// Worker pool size.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Queue depth limit; 0 queues without bound.
    #[serde(default)]
    pub queue_depth: usize,

    /// Hard per-task timeout in milliseconds.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Record per-task transition history (`stateTransitionHistory`).
    #[serde(default = "default_true")]
    pub record_history: bool,
}

fn default_worker_count() -> usize {
    4
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_depth: 0,
            task_timeout_ms: default_task_timeout_ms(),
            record_history: true,
        }
    }
}

impl RuntimeSection {
    /// Queue depth as the runtime expects it.
    pub fn queue_depth_limit(&self) -> Option<usize> {
        (self.queue_depth > 0).then_some(self.queue_depth)
    }

    /// Task timeout as a [`Duration`].
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

// ============= Authentication =============

/// Credential verification and per-caller rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the accepted bearer secret. Auth is
    /// disabled when the variable is unset or empty.
    #[serde(default = "default_bearer_secret_env")]
    pub bearer_secret_env: String,

    /// Sustained per-caller request rate; 0 disables rate limiting.
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,

    /// Per-caller burst allowance.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
}

fn default_bearer_secret_env() -> String {
    "ATLAS_BEARER_SECRET".to_string()
}

fn default_rate_limit_per_second() -> u32 {
    50
}

fn default_rate_limit_burst() -> u32 {
    100
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bearer_secret_env: default_bearer_secret_env(),
            rate_limit_per_second: default_rate_limit_per_second(),
            rate_limit_burst: default_rate_limit_burst(),
        }
    }
}

impl AuthConfig {
    /// Resolve the bearer secret from the environment, if configured.
    pub fn bearer_secret(&self) -> Option<String> {
        std::env::var(&self.bearer_secret_env)
            .ok()
            .filter(|s| !s.is_empty())
    }
}

// ============= Registry Client =============

/// Agent-side announcements to the discovery registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryClientConfig {
    /// Discovery registry base URL; announcements are skipped when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Seconds between re-announcements.
    #[serde(default = "default_announce_interval_secs")]
    pub announce_interval_secs: u64,

    /// Cap on the retry backoff in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_announce_interval_secs() -> u64 {
    30
}

fn default_max_backoff_secs() -> u64 {
    120
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            announce_interval_secs: default_announce_interval_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

// ============= Discovery Service =============

/// Settings for the standalone discovery registry service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_discovery_port")]
    pub port: u16,

    /// Seconds between health-check sweeps.
    #[serde(default = "default_health_interval_secs")]
    pub health_check_interval_secs: u64,

    /// Per-probe timeout in milliseconds.
    #[serde(default = "default_health_timeout_ms")]
    pub health_check_timeout_ms: u64,

    /// Consecutive failures before an agent is classified unreachable.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Agents never seen healthy are pruned after this many seconds.
    #[serde(default = "default_registration_grace_secs")]
    pub registration_grace_secs: u64,
}

fn default_discovery_port() -> u16 {
    4600
}

fn default_health_interval_secs() -> u64 {
    15
}

fn default_health_timeout_ms() -> u64 {
    2_000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_registration_grace_secs() -> u64 {
    120
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_discovery_port(),
            health_check_interval_secs: default_health_interval_secs(),
            health_check_timeout_ms: default_health_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            registration_grace_secs: default_registration_grace_secs(),
        }
    }
}

// ============= MCP Bridge =============

/// Outbound tool-call circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Consecutive failures before a backend's circuit opens.
    #[serde(default = "default_circuit_threshold")]
    pub circuit_failure_threshold: u32,

    /// Cool-down in milliseconds before a half-open trial call.
    #[serde(default = "default_circuit_cooldown_ms")]
    pub circuit_cooldown_ms: u64,
}

fn default_circuit_threshold() -> u32 {
    5
}

fn default_circuit_cooldown_ms() -> u64 {
    10_000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            circuit_failure_threshold: default_circuit_threshold(),
            circuit_cooldown_ms: default_circuit_cooldown_ms(),
        }
    }
}

// ============= Manager =============

/// Thread-safe snapshot access to the active configuration.
pub struct ConfigManager {
    current: ArcSwap<AtlasConfig>,
}

impl ConfigManager {
    /// Load configuration from a TOML file. A missing file yields defaults,
    /// matching local-first runs.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                AppError::Internal(format!("failed to read {}: {e}", path.display()))
            })?;
            toml::from_str(&raw).map_err(|e| {
                AppError::Validation(format!("invalid config {}: {e}", path.display()))
            })?
        } else {
            AtlasConfig::default()
        };
        Ok(Self::from_config(config))
    }

    /// Wrap an already-built configuration (tests, embedding).
    pub fn from_config(config: AtlasConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Arc<AtlasConfig> {
        self.current.load_full()
    }

    /// Replace the active configuration.
    pub fn replace(&self, config: AtlasConfig) {
        self.current.store(Arc::new(config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_an_empty_file() {
        let config: AtlasConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 4500);
        assert_eq!(config.runtime.worker_count, 4);
        assert_eq!(config.runtime.queue_depth_limit(), None);
        assert_eq!(config.discovery.failure_threshold, 3);
        assert_eq!(config.bridge.circuit_failure_threshold, 5);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config: AtlasConfig = toml::from_str(
            r#"
            [agent]
            id = "portfolio-agent"

            [runtime]
            worker_count = 8
            queue_depth = 64
            task_timeout_ms = 5000

            [registry]
            base_url = "http://localhost:4600"
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.id, "portfolio-agent");
        assert_eq!(config.runtime.worker_count, 8);
        assert_eq!(config.runtime.queue_depth_limit(), Some(64));
        assert_eq!(config.runtime.task_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.registry.base_url.as_deref(),
            Some("http://localhost:4600")
        );
        // Untouched sections keep their defaults.
        assert_eq!(config.auth.rate_limit_per_second, 50);
    }

    #[test]
    fn manager_loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9911").unwrap();

        let manager = ConfigManager::load(file.path()).unwrap();
        assert_eq!(manager.config().server.port, 9911);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let manager = ConfigManager::load("/definitely/not/here/atlas.toml").unwrap();
        assert_eq!(manager.config().server.port, 4500);
    }

    #[test]
    fn advertised_url_prefers_public_url() {
        let mut server = ServerConfig::default();
        assert_eq!(server.advertised_url(), "http://127.0.0.1:4500");
        server.public_url = Some("https://agents.example.com".into());
        assert_eq!(server.advertised_url(), "https://agents.example.com");
    }
}
