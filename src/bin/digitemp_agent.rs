//! Report a 1-Wire temperature sensor to collectd
use anyhow::Context;
use clap::Parser;
use log::error;
use putval_agents::agent::{self, CommonArgs};
use putval_agents::config::LogLevel;
use putval_agents::error::{ExitStatus, exit_status_of};
use putval_agents::sources::digitemp::{self, DigitempSettings, DigitempSource};
use std::process::ExitCode;
use std::time::Duration;

const ENV_PREFIX: &str = "DIGITEMP_AGENT";
const DEFAULT_INTERVAL: u64 = 10;

/// Turn digitemp sensor readings into collectd metrics
#[derive(Parser, Debug)]
#[command(name = "digitemp-agent", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Plugin name to report the metric under
    #[arg(long)]
    plugin: Option<String>,

    /// Serial device of the 1-Wire adapter
    #[arg(long)]
    device: Option<String>,

    /// Sensor index
    #[arg(long)]
    sensor: Option<u32>,
}

async fn run(cli: Cli) -> anyhow::Result<ExitStatus> {
    let settings = cli
        .common
        .config_builder::<DigitempSettings>(ENV_PREFIX, DEFAULT_INTERVAL)
        .default_value("source.device", DigitempSettings::default().device)
        .override_value("plugin", cli.plugin)
        .override_value("source.device", cli.device)
        .override_value("source.sensor", cli.sensor.map(i64::from))
        .build()
        .context("loading configuration")?;
    settings.validate()?;
    settings
        .source
        .validate(Duration::from_secs(settings.fetch_timeout_secs))?;

    putval_agents::init_logging(&settings.log_level);

    let source = DigitempSource::new(&settings.source);
    let table = digitemp::metric_table()?;
    Ok(agent::run_until_signal(source, table, settings.collector_config("digitemp")).await)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(status) => status.into(),
        Err(e) => {
            putval_agents::init_logging(&LogLevel::Error);
            error!("{:#}", e);
            exit_status_of(&e).into()
        }
    }
}
