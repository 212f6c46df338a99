//! Report SMA inverter power and yield to collectd
use anyhow::Context;
use clap::Parser;
use log::error;
use putval_agents::agent::{self, CommonArgs};
use putval_agents::config::LogLevel;
use putval_agents::error::{ExitStatus, exit_status_of};
use putval_agents::sources::sma::{self, SmaSettings, SmaSource};
use std::process::ExitCode;

const ENV_PREFIX: &str = "SMA_AGENT";
const DEFAULT_INTERVAL: u64 = 10;

/// Poll an SMA WebConnect instance for metrics and expose them to collectd
#[derive(Parser, Debug)]
#[command(name = "sma-agent", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Network address of the WebConnect instance
    #[arg(long)]
    address: Option<String>,

    /// User password; prefer SMA_AGENT__SOURCE__PASSWORD or the config file
    #[arg(long)]
    password: Option<String>,

    /// Log in as `user` or `installer`
    #[arg(long)]
    group: Option<String>,

    /// Accept the inverter's self-signed certificate
    #[arg(long)]
    insecure: bool,
}

async fn run(cli: Cli) -> anyhow::Result<ExitStatus> {
    let mut builder = cli
        .common
        .config_builder::<SmaSettings>(ENV_PREFIX, DEFAULT_INTERVAL)
        .override_value("source.address", cli.address)
        .override_value("source.password", cli.password)
        .override_value("source.group", cli.group);
    if cli.insecure {
        builder = builder.override_value("source.verify_tls", Some(false));
    }

    let settings = builder.build().context("loading configuration")?;
    settings.validate()?;

    putval_agents::init_logging(&settings.log_level);

    let source = SmaSource::new(&settings.source)?;
    let table = sma::metric_table()?;
    Ok(agent::run_until_signal(source, table, settings.collector_config("sma")).await)
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
