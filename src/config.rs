use log::{debug, error, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collector::{AbsentValue, CollectorConfig, CollectorConfigBuilder};
use crate::error::{AgentError, Result};

/// Environment variable collectd's exec plugin sets to the global hostname
pub const COLLECTD_HOSTNAME_ENV: &str = "COLLECTD_HOSTNAME";

/// Environment variable collectd's exec plugin sets to the global interval
pub const COLLECTD_INTERVAL_ENV: &str = "COLLECTD_INTERVAL";

/// Logging level
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(AgentError::Config(format!("Unknown log level: {}", other))),
        }
    }
}

impl LogLevel {
    /// Name accepted back by `FromStr` and the config file
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Settings shared by every agent, plus the source-specific section `S`
#[derive(Debug, Deserialize, Clone)]
pub struct AgentSettings<S> {
    /// Hostname the metrics are reported as
    pub host: String,
    /// Plugin identifier, for metric tables that use `{plugin}`
    #[serde(default)]
    pub plugin: Option<String>,
    /// Polling interval in seconds
    pub interval: u64,
    /// Upper bound on a single fetch, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Upper bound on releasing the source session, in seconds
    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,
    /// How a missing value is rendered
    #[serde(default)]
    pub absent_value: AbsentValue,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Source-specific settings
    pub source: S,
}

fn default_fetch_timeout() -> u64 {
    20
}

fn default_close_timeout() -> u64 {
    5
}

impl<S> AgentSettings<S> {
    /// Reject settings the collector loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AgentError::Config("host must not be empty".to_string()));
        }
        if self.interval == 0 {
            return Err(AgentError::Config("interval must be at least 1 second".to_string()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(AgentError::Config(
                "fetch_timeout_secs must be at least 1 second".to_string(),
            ));
        }
        if let Some(plugin) = &self.plugin {
            if plugin.trim().is_empty() {
                return Err(AgentError::Config("plugin must not be empty when set".to_string()));
            }
        }
        Ok(())
    }

    /// Build the collector loop configuration from these settings
    pub fn collector_config(&self, name: impl Into<String>) -> CollectorConfig {
        let mut builder = CollectorConfigBuilder::new(name, self.host.clone())
            .interval(Duration::from_secs(self.interval))
            .fetch_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .close_timeout(Duration::from_secs(self.close_timeout_secs))
            .absent_value(self.absent_value);
        if let Some(plugin) = &self.plugin {
            builder = builder.plugin(plugin.clone());
        }
        builder.build()
    }
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// TOML file that must exist
    File(PathBuf),
    /// Environment variables with a prefix, `__` separating nested keys
    Environment(String),
    /// TOML string
    Toml(String),
    /// Value used when no other source sets the key
    Default(String, config::Value),
    /// Value that wins over every other source
    Override(String, config::Value),
    /// `COLLECTD_HOSTNAME` / `COLLECTD_INTERVAL` as fallbacks for host and interval
    CollectdExec,
}

/// Helper function to load configuration from various sources
pub fn load_config<T>(sources: Vec<ConfigSource>) -> Result<T>
where
    T: DeserializeOwned + Debug,
{
    let mut builder = config::Config::builder();

    for source in sources {
        builder = match source {
            ConfigSource::File(path) => {
                if !path.exists() {
                    error!("Configuration file {} does not exist", path.display());
                    return Err(AgentError::Config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                debug!("Loading TOML configuration from file: {}", path.display());
                builder.add_source(config::File::from(path).format(config::FileFormat::Toml))
            }
            ConfigSource::Environment(prefix) => {
                debug!("Loading configuration from environment with prefix: {}", prefix);
                builder.add_source(
                    config::Environment::with_prefix(&prefix)
                        .separator("__")
                        .try_parsing(true),
                )
            }
            ConfigSource::Toml(toml_str) => {
                debug!("Loading configuration from TOML string");
                builder.add_source(config::File::from_str(&toml_str, config::FileFormat::Toml))
            }
            ConfigSource::Default(key, value) => builder
                .set_default(key.as_str(), value)
                .map_err(|e| AgentError::Config(format!("Invalid default for {}: {}", key, e)))?,
            ConfigSource::Override(key, value) => builder
                .set_override(key.as_str(), value)
                .map_err(|e| AgentError::Config(format!("Invalid override for {}: {}", key, e)))?,
            ConfigSource::CollectdExec => {
                let (host, interval) = collectd_exec_defaults(|key| std::env::var(key).ok());
                let builder = match host {
                    Some(host) => builder
                        .set_default("host", host)
                        .map_err(|e| AgentError::Config(e.to_string()))?,
                    None => builder,
                };
                match interval {
                    Some(interval) => builder
                        .set_default("interval", interval)
                        .map_err(|e| AgentError::Config(e.to_string()))?,
                    None => builder,
                }
            }
        };
    }

    let config = builder
        .build()
        .map_err(|e| AgentError::Config(format!("Failed to build configuration: {}", e)))?;

    let result = config
        .try_deserialize()
        .map_err(|e| AgentError::Config(format!("Failed to deserialize configuration: {}", e)))?;

    debug!("Configuration loaded successfully: {:?}", result);

    Ok(result)
}

/// Read the host and interval collectd hands to exec'd programs.
///
/// collectd formats the interval as a float (`"10.000"`); it is rounded to
/// whole seconds. Values that do not parse are ignored.
pub fn collectd_exec_defaults<F>(lookup: F) -> (Option<String>, Option<u64>)
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup(COLLECTD_HOSTNAME_ENV)
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());

    let interval = lookup(COLLECTD_INTERVAL_ENV).and_then(|raw| match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 1.0 => Some(secs.round() as u64),
        _ => {
            warn!("Ignoring unusable {}={}", COLLECTD_INTERVAL_ENV, raw);
            None
        }
    });

    (host, interval)
}

/// Configuration builder
pub struct ConfigBuilder<T: DeserializeOwned> {
    sources: Vec<ConfigSource>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: DeserializeOwned + Debug> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Debug> ConfigBuilder<T> {
    /// Create a new config builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Add a TOML file source
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add environment variables
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Fall back to collectd's exec environment for host and interval
    pub fn add_collectd_exec(mut self) -> Self {
        self.sources.push(ConfigSource::CollectdExec);
        self
    }

    /// Set a default value
    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<config::Value>) -> Self {
        self.sources.push(ConfigSource::Default(key.into(), value.into()));
        self
    }

    /// Override a key when a value is given
    pub fn override_value<V: Into<config::Value>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.sources.push(ConfigSource::Override(key.into(), value.into()));
        }
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<T> {
        load_config::<T>(self.sources)
    }
}
