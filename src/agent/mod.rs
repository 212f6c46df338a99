//! Process wiring shared by the agent binaries
use clap::Args;
use log::{error, info};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::collector::{CollectorConfig, CollectorLoop, MetricTable, Source};
use crate::config::{AgentSettings, ConfigBuilder, LogLevel};
use crate::error::ExitStatus;
use crate::output::{LineSink, MetricSink};
use crate::shutdown::spawn_signal_listener;

/// Command line options every agent accepts
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hostname to report metrics as
    #[arg(long)]
    pub host: Option<String>,

    /// Interval between metric emissions, in seconds
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Give up on a fetch after this many seconds
    #[arg(long)]
    pub fetch_timeout: Option<u64>,

    /// Render missing values as `zero` or `unknown`
    #[arg(long)]
    pub absent_value: Option<String>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<LogLevel>,
}

impl CommonArgs {
    /// Layer defaults, file, environment and these options, lowest first
    pub fn config_builder<S>(&self, env_prefix: &str, default_interval: u64) -> ConfigBuilder<AgentSettings<S>>
    where
        S: DeserializeOwned + Debug,
    {
        let mut builder = ConfigBuilder::new()
            .default_value("interval", default_interval as i64)
            .add_collectd_exec();

        if let Some(path) = &self.config {
            builder = builder.add_file(path);
        }

        builder
            .add_env(env_prefix)
            .override_value("host", self.host.clone())
            .override_value("interval", self.interval.map(|secs| secs as i64))
            .override_value("fetch_timeout_secs", self.fetch_timeout.map(|secs| secs as i64))
            .override_value("absent_value", self.absent_value.clone())
            .override_value("log_level", self.log_level.map(|level| level.as_str()))
    }
}

/// Run a collector that writes to stdout until SIGINT/SIGTERM or a fatal error
pub async fn run_until_signal<S: Source>(source: S, table: MetricTable, config: CollectorConfig) -> ExitStatus {
    let mut collector = match CollectorLoop::new(source, LineSink::stdout(), table, config) {
        Ok(collector) => collector,
        Err(e) => {
            error!("Invalid collector setup: {}", e);
            return e.exit_status();
        }
    };

    let token = CancellationToken::new();
    let listener = spawn_signal_listener(token.clone());
    let status = run_with_token(&mut collector, token).await;
    listener.abort();
    status
}

/// Run `collector` until `token` is cancelled or a fatal error occurs
pub async fn run_with_token<S: Source, K: MetricSink>(
    collector: &mut CollectorLoop<S, K>,
    token: CancellationToken,
) -> ExitStatus {
    match collector.run(token).await {
        Ok(()) => {
            info!("Collector {} stopped cleanly", collector.config().name);
            ExitStatus::Clean
        }
        Err(e) => {
            let status = e.exit_status();
            error!(
                "Collector {} exiting with status {}: {}",
                collector.config().name,
                status.code(),
                e
            );
            status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde::Deserialize;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        common: CommonArgs,
    }

    #[derive(Debug, Deserialize)]
    struct TestSource {
        device: String,
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = TestCli::parse_from(["agent", "--host", "h1", "--log-level", "debug"]);

        let settings = cli
            .common
            .config_builder::<TestSource>("PUTVAL_AGENTS_TEST_UNSET", 10)
            .default_value("source.device", "/dev/ttyUSB0")
            .build()
            .unwrap();

        assert_eq!(settings.host, "h1");
        assert_eq!(settings.interval, 10);
        assert_eq!(settings.source.device, "/dev/ttyUSB0");
        assert_eq!(settings.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_interval_flag_wins() {
        let cli = TestCli::parse_from(["agent", "--host", "h1", "-i", "30"]);

        let settings = cli
            .common
            .config_builder::<TestSource>("PUTVAL_AGENTS_TEST_UNSET", 60)
            .override_value("source.device", Some("/dev/ttyS0"))
            .build()
            .unwrap();

        assert_eq!(settings.interval, 30);
        assert_eq!(settings.source.device, "/dev/ttyS0");
    }

    #[test]
    fn test_log_level_flag_is_checked() {
        let cli = TestCli::parse_from(["agent", "--log-level", "Warning"]);
        assert_eq!(cli.common.log_level, Some(LogLevel::Warn));

        assert!(TestCli::try_parse_from(["agent", "--log-level", "loud"]).is_err());
    }
}
