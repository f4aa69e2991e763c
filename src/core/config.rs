//! Configuration parsing and validation.
//!
//! Configuration is loaded from a TOML file, optionally adjusted from the
//! deployment environment and CLI overrides, and read once at start. Every
//! section has defaults, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::store::scope::ScopeKind;

/// Environment variable overriding the default Global TTL (seconds).
pub const ENV_DEFAULT_GLOBAL_TTL: &str = "EVENTSTORE_DEFAULT_GLOBAL_TTL";
/// Environment variable overriding the default Bridge TTL (seconds).
pub const ENV_DEFAULT_BRIDGE_TTL: &str = "EVENTSTORE_DEFAULT_BRIDGE_TTL";
/// Environment variable overriding the default Instance TTL (seconds).
pub const ENV_DEFAULT_INSTANCE_TTL: &str = "EVENTSTORE_DEFAULT_INSTANCE_TTL";
/// Environment variable overriding the sweeper period (seconds).
pub const ENV_EXPIRED_GC_PERIOD: &str = "EVENTSTORE_DEFAULT_EXPIRED_GC_PERIOD";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// RPC listener configuration.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Storage engine configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// RPC listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Idle connection timeout in milliseconds.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Largest accepted frame body in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_connections: default_max_connections(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ListenerConfig {
    /// Parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid listener.bind address: {}", self.bind))
    }
}

/// Storage engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default TTL for Global scope entries.
    #[serde(default = "default_global_ttl_seconds")]
    pub default_global_ttl_seconds: u64,

    /// Default TTL for Bridge scope entries.
    #[serde(default = "default_bridge_ttl_seconds")]
    pub default_bridge_ttl_seconds: u64,

    /// Default TTL for Instance scope entries.
    #[serde(default = "default_instance_ttl_seconds")]
    pub default_instance_ttl_seconds: u64,

    /// Sweeper period.
    #[serde(default = "default_expired_gc_period_seconds")]
    pub expired_gc_period_seconds: u64,

    /// Lock timeout used when a request asks for 0.
    #[serde(default = "default_lock_timeout_seconds")]
    pub default_lock_timeout_seconds: u64,

    /// Deadline applied to requests that carry none.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_global_ttl_seconds: default_global_ttl_seconds(),
            default_bridge_ttl_seconds: default_bridge_ttl_seconds(),
            default_instance_ttl_seconds: default_instance_ttl_seconds(),
            expired_gc_period_seconds: default_expired_gc_period_seconds(),
            default_lock_timeout_seconds: default_lock_timeout_seconds(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Default TTL for entries created under `kind`.
    pub fn default_ttl(&self, kind: ScopeKind) -> Duration {
        let seconds = match kind {
            ScopeKind::Global => self.default_global_ttl_seconds,
            ScopeKind::Bridge => self.default_bridge_ttl_seconds,
            ScopeKind::Instance => self.default_instance_ttl_seconds,
        };
        Duration::from_secs(seconds)
    }

    /// Sweeper period.
    pub fn gc_period(&self) -> Duration {
        Duration::from_secs(self.expired_gc_period_seconds)
    }

    /// Lock timeout used when a request asks for 0.
    pub fn default_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.default_lock_timeout_seconds)
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_idle_timeout_ms() -> u64 {
    300_000
}

fn default_max_frame_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_global_ttl_seconds() -> u64 {
    3_600
}

fn default_bridge_ttl_seconds() -> u64 {
    600
}

fn default_instance_ttl_seconds() -> u64 {
    60
}

fn default_expired_gc_period_seconds() -> u64 {
    5
}

fn default_lock_timeout_seconds() -> u64 {
    30
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render config")
    }

    /// Apply the deployment environment variables, if set.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets = [
            (
                ENV_DEFAULT_GLOBAL_TTL,
                &mut self.store.default_global_ttl_seconds,
            ),
            (
                ENV_DEFAULT_BRIDGE_TTL,
                &mut self.store.default_bridge_ttl_seconds,
            ),
            (
                ENV_DEFAULT_INSTANCE_TTL,
                &mut self.store.default_instance_ttl_seconds,
            ),
            (
                ENV_EXPIRED_GC_PERIOD,
                &mut self.store.expired_gc_period_seconds,
            ),
        ];
        for (name, slot) in targets {
            if let Some(raw) = lookup(name) {
                *slot = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a number of seconds, got: {}", name, raw))?;
            }
        }
        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref bind) = overrides.bind {
            self.listener.bind = bind.clone();
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_listener()?;
        self.validate_store()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_listener(&self) -> Result<()> {
        self.listener.bind_addr()?;

        if self.listener.max_connections == 0 {
            anyhow::bail!("listener.max_connections must be > 0");
        }

        if self.listener.max_frame_bytes < 1024 {
            anyhow::bail!(
                "listener.max_frame_bytes must be at least 1024, got: {}",
                self.listener.max_frame_bytes
            );
        }

        Ok(())
    }

    fn validate_store(&self) -> Result<()> {
        let store = &self.store;
        let positive = [
            (
                "store.default_global_ttl_seconds",
                store.default_global_ttl_seconds,
            ),
            (
                "store.default_bridge_ttl_seconds",
                store.default_bridge_ttl_seconds,
            ),
            (
                "store.default_instance_ttl_seconds",
                store.default_instance_ttl_seconds,
            ),
            (
                "store.expired_gc_period_seconds",
                store.expired_gc_period_seconds,
            ),
            (
                "store.default_lock_timeout_seconds",
                store.default_lock_timeout_seconds,
            ),
            ("store.request_timeout_ms", store.request_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                anyhow::bail!("{} must be > 0", name);
            }
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override listener bind address.
    pub bind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.listener.bind, "0.0.0.0:8080");
        assert_eq!(config.store.expired_gc_period_seconds, 5);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(
            config.store.default_ttl(ScopeKind::Instance),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
[store]
default_global_ttl_seconds = 10
default_bridge_ttl_seconds = 5
default_instance_ttl_seconds = 2
"#,
        )
        .unwrap();
        assert_eq!(config.store.default_ttl(ScopeKind::Global).as_secs(), 10);
        assert_eq!(config.store.default_ttl(ScopeKind::Bridge).as_secs(), 5);
        assert_eq!(config.store.default_ttl(ScopeKind::Instance).as_secs(), 2);
        assert_eq!(config.store.default_lock_timeout_seconds, 30);
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let err = Config::from_toml("[store]\ndefault_bridge_ttl_seconds = 0\n").unwrap_err();
        assert!(err.to_string().contains("default_bridge_ttl_seconds"));
    }

    #[test]
    fn test_rejects_bad_bind() {
        assert!(Config::from_toml("[listener]\nbind = \"not-an-addr\"\n").is_err());
    }

    #[test]
    fn test_rejects_bad_log_level() {
        assert!(Config::from_toml("[telemetry]\nlog_level = \"loud\"\n").is_err());
    }

    #[test]
    fn test_apply_env() {
        let vars: HashMap<&str, &str> = [
            (ENV_DEFAULT_GLOBAL_TTL, "10"),
            (ENV_EXPIRED_GC_PERIOD, " 7 "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_with(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.store.default_global_ttl_seconds, 10);
        assert_eq!(config.store.expired_gc_period_seconds, 7);
        assert_eq!(config.store.default_bridge_ttl_seconds, 600);
    }

    #[test]
    fn test_apply_env_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env_with(|name| (name == ENV_DEFAULT_BRIDGE_TTL).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_DEFAULT_BRIDGE_TTL));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            log_level: Some("debug".into()),
            bind: Some("127.0.0.1:9000".into()),
        });
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.listener.bind_addr().unwrap().port(), 9000);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed = Config::from_toml(&rendered).unwrap();
        assert_eq!(parsed.listener.bind, config.listener.bind);
    }
}
