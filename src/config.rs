use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError as ConfigCrateError, Environment, File};
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub timings: TimingsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the worker fleet is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    Cluster,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_discovery_mode")]
    pub mode: DiscoveryMode,
    /// Worker `host:port` entries for static mode.
    #[serde(default, rename = "static")]
    pub static_workers: Vec<String>,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_namespace")]
    pub namespace: String,
    #[serde(default = "default_cluster_service")]
    pub service: String,
    #[serde(default = "default_cluster_port")]
    pub port: u16,
    #[serde(default = "default_cluster_target_port")]
    pub target_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
    #[serde(default = "default_model_key_prefix")]
    pub model_key_prefix: String,
    #[serde(default = "default_worker_load_key_prefix")]
    pub worker_load_key_prefix: String,
    #[serde(default = "default_registry_ttl_seconds")]
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingsConfig {
    #[serde(default = "default_discover_ms")]
    pub discover_ms: u64,
    #[serde(default = "default_health_ms")]
    pub health_ms: u64,
    #[serde(default = "default_reconcile_ms")]
    pub reconcile_ms: u64,
    #[serde(default = "default_verify_ttl_ms")]
    pub verify_ttl_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_probe_ms")]
    pub probe_ms: u64,
    #[serde(default = "default_load_ms")]
    pub load_ms: u64,
    #[serde(default = "default_unload_ms")]
    pub unload_ms: u64,
    #[serde(default = "default_registry_ms")]
    pub registry_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_health_fanout")]
    pub health_fanout: usize,
    #[serde(default = "default_load_fanout")]
    pub load_fanout: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Defaults
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_discovery_mode() -> DiscoveryMode { DiscoveryMode::Static }
fn default_cluster_namespace() -> String { "serving".to_string() }
fn default_cluster_service() -> String { "worker-service".to_string() }
fn default_cluster_port() -> u16 { 80 }
fn default_cluster_target_port() -> u16 { 8000 }
fn default_registry_url() -> String { "redis://localhost:6379".to_string() }
fn default_model_key_prefix() -> String { "model:".to_string() }
fn default_worker_load_key_prefix() -> String { "worker:load:".to_string() }
fn default_registry_ttl_seconds() -> u64 { 300 }
fn default_discover_ms() -> u64 { 30_000 }
fn default_health_ms() -> u64 { 10_000 }
fn default_reconcile_ms() -> u64 { 60_000 }
fn default_verify_ttl_ms() -> u64 { 30_000 }
fn default_probe_ms() -> u64 { 2_000 }
fn default_load_ms() -> u64 { 60_000 }
fn default_unload_ms() -> u64 { 10_000 }
fn default_registry_ms() -> u64 { 2_000 }
fn default_health_fanout() -> usize { 16 }
fn default_load_fanout() -> usize { 4 }
fn default_log_level() -> String { "info".to_string() }

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            mode: default_discovery_mode(),
            static_workers: Vec::new(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: default_cluster_namespace(),
            service: default_cluster_service(),
            port: default_cluster_port(),
            target_port: default_cluster_target_port(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            model_key_prefix: default_model_key_prefix(),
            worker_load_key_prefix: default_worker_load_key_prefix(),
            ttl_seconds: default_registry_ttl_seconds(),
        }
    }
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            discover_ms: default_discover_ms(),
            health_ms: default_health_ms(),
            reconcile_ms: default_reconcile_ms(),
            verify_ttl_ms: default_verify_ttl_ms(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            probe_ms: default_probe_ms(),
            load_ms: default_load_ms(),
            unload_ms: default_unload_ms(),
            registry_ms: default_registry_ms(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            health_fanout: default_health_fanout(),
            load_fanout: default_load_fanout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl TimingsConfig {
    pub fn discover(&self) -> Duration { Duration::from_millis(self.discover_ms) }
    pub fn health(&self) -> Duration { Duration::from_millis(self.health_ms) }
    pub fn reconcile(&self) -> Duration { Duration::from_millis(self.reconcile_ms) }
    pub fn verify_ttl(&self) -> Duration { Duration::from_millis(self.verify_ttl_ms) }
}

impl TimeoutsConfig {
    pub fn probe(&self) -> Duration { Duration::from_millis(self.probe_ms) }
    pub fn load(&self) -> Duration { Duration::from_millis(self.load_ms) }
    pub fn unload(&self) -> Duration { Duration::from_millis(self.unload_ms) }
    pub fn registry(&self) -> Duration { Duration::from_millis(self.registry_ms) }
}

impl RegistryConfig {
    pub fn assign_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    LoadError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

impl Config {
    /// Load configuration from config.toml (if present) and environment
    /// variables. Environment variables override file settings.
    /// Env var format: GATEWAY__SECTION__KEY (e.g., GATEWAY__REGISTRY__URL)
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_host_and_port() {
        assert_eq!(default_host(), "0.0.0.0");
        assert_eq!(default_port(), 8080);
    }

    #[test]
    fn test_default_registry() {
        let registry = RegistryConfig::default();
        assert_eq!(registry.url, "redis://localhost:6379");
        assert_eq!(registry.model_key_prefix, "model:");
        assert_eq!(registry.worker_load_key_prefix, "worker:load:");
        assert_eq!(registry.ttl_seconds, 300);
        assert_eq!(registry.assign_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_default_timings() {
        let timings = TimingsConfig::default();
        assert_eq!(timings.discover(), Duration::from_secs(30));
        assert_eq!(timings.health(), Duration::from_secs(10));
        assert_eq!(timings.reconcile(), Duration::from_secs(60));
        assert_eq!(timings.verify_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = TimeoutsConfig::default();
        assert_eq!(timeouts.probe(), Duration::from_secs(2));
        assert_eq!(timeouts.load(), Duration::from_secs(60));
        assert_eq!(timeouts.unload(), Duration::from_secs(10));
        assert_eq!(timeouts.registry(), Duration::from_secs(2));
    }

    #[test]
    fn test_default_concurrency() {
        let concurrency = ConcurrencyConfig::default();
        assert_eq!(concurrency.health_fanout, 16);
        assert_eq!(concurrency.load_fanout, 4);
    }

    #[test]
    fn test_default_workers_mode_is_static() {
        let workers = WorkersConfig::default();
        assert_eq!(workers.mode, DiscoveryMode::Static);
        assert!(workers.static_workers.is_empty());
    }

    #[test]
    fn test_default_cluster() {
        let cluster = ClusterConfig::default();
        assert_eq!(cluster.namespace, "serving");
        assert_eq!(cluster.service, "worker-service");
        assert_eq!(cluster.port, 80);
        assert_eq!(cluster.target_port, 8000);
    }

    #[test]
    fn test_discovery_mode_deserializes_lowercase() {
        let mode: DiscoveryMode = serde_json::from_str(r#""cluster""#).unwrap();
        assert_eq!(mode, DiscoveryMode::Cluster);
        let mode: DiscoveryMode = serde_json::from_str(r#""static""#).unwrap();
        assert_eq!(mode, DiscoveryMode::Static);
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::LoadError("test error".to_string());
        assert!(error.to_string().contains("Configuration error"));
    }
}
