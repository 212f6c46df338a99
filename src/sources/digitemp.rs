//! 1-Wire temperature sensors read through `digitemp`.
//!
//! Each fetch runs the command once and reads the first line it prints.
//! Every failure (the program is missing, exits non-zero, hangs past the
//! command timeout, or prints something that is not a number) only degrades
//! the tick.

use serde::Deserialize;
use std::time::Duration;

use crate::collector::{MetricDescriptor, MetricTable, Reading, Source};
use crate::error::{AgentError, Result};
use crate::process::{Command, FloatParser, first_record};

/// Default metric table: a single air temperature
pub fn metric_table() -> Result<MetricTable> {
    MetricTable::new(vec![MetricDescriptor::new("{host}/{plugin}/temperature-air", "air_temp")])
}

fn default_program() -> String {
    "digitemp_DS9097".to_string()
}

fn default_config_file() -> String {
    "/etc/digitemp.conf".to_string()
}

fn default_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_command_timeout() -> u64 {
    15
}

/// Settings for the digitemp source
#[derive(Debug, Deserialize, Clone)]
pub struct DigitempSettings {
    #[serde(default = "default_program")]
    pub program: String,
    /// digitemp's own configuration file
    #[serde(default = "default_config_file")]
    pub config_file: String,
    /// Serial port the 1-Wire adapter is on
    #[serde(default = "default_device")]
    pub device: String,
    /// Sensor index
    #[serde(default)]
    pub sensor: u32,
    /// Read timeout passed to digitemp, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Deadline for one run of the command, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for DigitempSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            config_file: default_config_file(),
            device: default_device(),
            sensor: 0,
            read_timeout_ms: default_read_timeout_ms(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl DigitempSettings {
    /// The command must give up before the collector loop's fetch deadline,
    /// otherwise a hung sensor read ends the agent instead of one tick.
    pub fn validate(&self, fetch_timeout: Duration) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(AgentError::Config(
                "command_timeout_secs must be at least 1 second".to_string(),
            ));
        }
        if Duration::from_secs(self.command_timeout_secs) >= fetch_timeout {
            return Err(AgentError::Config(format!(
                "command_timeout_secs ({}) must be less than the fetch timeout ({}s)",
                self.command_timeout_secs,
                fetch_timeout.as_secs()
            )));
        }
        Ok(())
    }

    /// The command that prints one sensor's temperature in Celsius
    pub fn command(&self) -> Command {
        Command::new(self.program.as_str()).args([
            "-c".to_string(),
            self.config_file.clone(),
            "-q".to_string(),
            "-t".to_string(),
            self.sensor.to_string(),
            "-s".to_string(),
            self.device.clone(),
            "-r".to_string(),
            self.read_timeout_ms.to_string(),
            "-o".to_string(),
            "%.2C".to_string(),
        ])
    }
}

/// Reads a sensor by running a command
pub struct DigitempSource {
    command: Command,
    command_timeout: Duration,
    name: String,
}

impl DigitempSource {
    pub fn new(settings: &DigitempSettings) -> Self {
        Self {
            command: settings.command(),
            command_timeout: Duration::from_secs(settings.command_timeout_secs),
            name: format!("digitemp {} sensor {}", settings.device, settings.sensor),
        }
    }

    /// Read from an arbitrary command printing a number on its first line
    pub fn from_command(command: Command, command_timeout: Duration) -> Self {
        Self {
            name: format!("command {}", command.program()),
            command,
            command_timeout,
        }
    }
}

#[async_trait::async_trait]
impl Source for DigitempSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self, _keys: &[String]) -> Result<Reading> {
        let output = self.command.output(self.command_timeout).await?;
        let value = first_record(&output.stdout, &FloatParser)?;
        Ok(Reading::new(vec![Some(value)]))
    }
}
