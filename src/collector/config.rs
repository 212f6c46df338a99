use std::time::Duration;

use super::metric::AbsentValue;

/// Configuration for a collector loop
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Name of the collector, used in logs
    pub name: String,
    /// Host identifier substituted for `{host}`
    pub host: String,
    /// Plugin identifier substituted for `{plugin}`
    pub plugin: Option<String>,
    /// Time between ticks, echoed in every record
    pub interval: Duration,
    /// Upper bound on opening the source and on each fetch
    pub fetch_timeout: Duration,
    /// Upper bound on releasing the source during shutdown
    pub close_timeout: Duration,
    /// How absent values are rendered
    pub absent_value: AbsentValue,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            name: "default_collector".to_string(),
            host: "localhost".to_string(),
            plugin: None,
            interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(20),
            close_timeout: Duration::from_secs(5),
            absent_value: AbsentValue::Zero,
        }
    }
}

/// Builder for collector configuration
pub struct CollectorConfigBuilder {
    config: CollectorConfig,
}

impl CollectorConfigBuilder {
    /// Create a new collector config builder
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            config: CollectorConfig {
                name: name.into(),
                host: host.into(),
                ..Default::default()
            },
        }
    }

    /// Set the plugin identifier
    pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
        self.config.plugin = Some(plugin.into());
        self
    }

    /// Set the collection interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the fetch timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    /// Set the close timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Set the absent value policy
    pub fn absent_value(mut self, absent: AbsentValue) -> Self {
        self.config.absent_value = absent;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CollectorConfig {
        self.config
    }
}
