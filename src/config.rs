use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::CapabilityError;
use crate::probes::StatusPolicy;

pub const CONFIG_FILE: &str = "agent-reach.toml";
pub const RC_FILE: &str = ".agent-reach-rc";
pub const ENV_PREFIX: &str = "AGENT_REACH";

/// Longest cache retention accepted, ten years
pub const MAX_TTL_DAYS: u64 = 3_650;

/// Main configuration structure for agent-reach
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentReachConfig {
    pub runner: RunnerConfig,
    pub cache: CacheConfig,
    pub probes: ProbesConfig,
    pub observability: ObservabilityConfig,
    /// Persistent result store, used with the `database` feature
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Hard wall-clock budget for secret resolution plus probing
    pub overall_timeout_secs: u64,
    /// Validations allowed in flight at once
    pub pool_size: usize,
    /// Probe launches per second across the whole runner
    pub probes_per_second: u32,
    /// Minimum time the completion callback gets, even after a timeout
    pub callback_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            overall_timeout_secs: 30,
            pool_size: 32,
            probes_per_second: 50,
            callback_timeout_secs: 10,
        }
    }
}

impl RunnerConfig {
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_days: u64,
    pub max_capacity: u64,
    /// Oldest verdict the dispatcher trusts without re-validating
    pub default_max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: 30,
            max_capacity: 100_000,
            default_max_age_secs: 24 * 60 * 60,
        }
    }
}

impl CacheConfig {
    /// Retention, capped at [`MAX_TTL_DAYS`] for configs that skipped `validate`
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.min(MAX_TTL_DAYS) * 24 * 60 * 60)
    }

    pub fn default_max_age(&self) -> Duration {
        Duration::from_secs(self.default_max_age_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbesConfig {
    pub http_timeout_secs: u64,
    pub socket_timeout_secs: u64,
    pub ssh_timeout_secs: u64,
    pub scm_timeout_secs: u64,
    pub secret_manager_timeout_secs: u64,
    pub cluster_timeout_secs: u64,
    pub registry_timeout_secs: u64,
    pub http_status_policy: StatusPolicy,
    pub cluster_status_policy: StatusPolicy,
    pub registry_status_policy: StatusPolicy,
    /// Skip TLS verification, for self-signed internal endpoints
    pub accept_invalid_certs: bool,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 15,
            socket_timeout_secs: 10,
            ssh_timeout_secs: 15,
            scm_timeout_secs: 30,
            secret_manager_timeout_secs: 20,
            cluster_timeout_secs: 15,
            registry_timeout_secs: 15,
            http_status_policy: StatusPolicy::ClientErrorsReachable,
            cluster_status_policy: StatusPolicy::Strict,
            registry_status_policy: StatusPolicy::Allow(vec![401]),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, overridden by RUST_LOG
    pub log_level: String,
    /// JSON lines instead of human-readable logs
    pub json_logs: bool,
    /// Log metric counters when the process exits
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://.agent-reach/validations.db".to_string(),
            max_connections: 5,
            auto_migrate: true,
        }
    }
}

impl AgentReachConfig {
    /// Load from the working directory
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Defaults, then `agent-reach.toml`, then `.agent-reach-rc`, then
    /// `AGENT_REACH_<SECTION>__<KEY>` environment variables
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = dir.join(CONFIG_FILE);
        if config_file.exists() {
            builder = builder.add_source(File::from(config_file).format(config::FileFormat::Toml));
        }

        let rc_file = dir.join(RC_FILE);
        if rc_file.exists() {
            builder = builder.add_source(File::from(rc_file).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: AgentReachConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> Result<(), CapabilityError> {
        if self.runner.pool_size == 0 {
            return Err(CapabilityError::Config("runner.pool_size must be at least 1".to_string()));
        }
        if self.runner.probes_per_second == 0 {
            return Err(CapabilityError::Config(
                "runner.probes_per_second must be at least 1".to_string(),
            ));
        }
        if self.runner.overall_timeout_secs == 0 {
            return Err(CapabilityError::Config(
                "runner.overall_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.cache.ttl_days == 0 {
            return Err(CapabilityError::Config("cache.ttl_days must be at least 1".to_string()));
        }
        if self.cache.ttl_days > MAX_TTL_DAYS {
            return Err(CapabilityError::Config(format!(
                "cache.ttl_days must be at most {MAX_TTL_DAYS}, got {}",
                self.cache.ttl_days
            )));
        }
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

static CONFIG: std::sync::LazyLock<Result<AgentReachConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = AgentReachConfig::load_env_file();
        AgentReachConfig::load()
    });

/// Process-wide configuration, loaded on first use
pub fn config() -> Result<&'static AgentReachConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentReachConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.runner.overall_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache.ttl(), Duration::from_secs(30 * 24 * 60 * 60));
        assert_eq!(config.runner.pool_size, 32);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[runner]
overall_timeout_secs = 5

[probes]
registry_status_policy = "strict"
"#,
        )
        .unwrap();

        let config = AgentReachConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.runner.overall_timeout_secs, 5);
        assert_eq!(config.runner.pool_size, 32);
        assert_eq!(config.probes.registry_status_policy, StatusPolicy::Strict);
    }

    #[test]
    fn test_rc_file_wins_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[cache]\nttl_days = 7\n").unwrap();
        std::fs::write(dir.path().join(RC_FILE), "[cache]\nttl_days = 3\n").unwrap();

        let config = AgentReachConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.cache.ttl_days, 3);
    }

    #[test]
    fn test_zero_pool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[runner]\npool_size = 0\n").unwrap();
        assert!(AgentReachConfig::load_from(dir.path()).is_err());
    }

    #[test]
    fn test_oversized_ttl_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[cache]\nttl_days = 1000000\n").unwrap();
        assert!(AgentReachConfig::load_from(dir.path()).is_err());

        let mut config = AgentReachConfig::default();
        config.cache.ttl_days = MAX_TTL_DAYS;
        assert!(config.validate().is_ok());
        config.cache.ttl_days = MAX_TTL_DAYS + 1;
        assert!(matches!(config.validate(), Err(CapabilityError::Config(_))));
    }

    #[test]
    fn test_unvalidated_ttl_is_capped() {
        let cache = CacheConfig {
            ttl_days: u64::MAX,
            ..CacheConfig::default()
        };
        assert_eq!(cache.ttl(), Duration::from_secs(MAX_TTL_DAYS * 24 * 60 * 60));
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentReachConfig::default();
        config.runner.probes_per_second = 7;
        config.save_to_file(dir.path().join(CONFIG_FILE)).unwrap();

        let loaded = AgentReachConfig::load_from(dir.path()).unwrap();
        assert_eq!(loaded.runner.probes_per_second, 7);
        assert_eq!(loaded.probes.registry_status_policy, StatusPolicy::Allow(vec![401]));
    }
}
