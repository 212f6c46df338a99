//! Report Bureau of Meteorology station observations to collectd
use anyhow::Context;
use clap::Parser;
use log::error;
use putval_agents::agent::{self, CommonArgs};
use putval_agents::config::LogLevel;
use putval_agents::error::{ExitStatus, exit_status_of};
use putval_agents::sources::bom::{self, BomSettings, BomSource};
use std::process::ExitCode;

const ENV_PREFIX: &str = "BOM_AGENT";
const DEFAULT_INTERVAL: u64 = 60;

/// Turn weather station readings into collectd metrics
#[derive(Parser, Debug)]
#[command(name = "bom-agent", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Area (product) id of the station, e.g. IDN60901
    #[arg(long)]
    area_id: Option<String>,

    /// Station id, e.g. 94768
    #[arg(long)]
    station_id: Option<String>,
}

async fn run(cli: Cli) -> anyhow::Result<ExitStatus> {
    let settings = cli
        .common
        .config_builder::<BomSettings>(ENV_PREFIX, DEFAULT_INTERVAL)
        .override_value("source.area_id", cli.area_id)
        .override_value("source.station_id", cli.station_id)
        .build()
        .context("loading configuration")?;
    settings.validate()?;

    putval_agents::init_logging(&settings.log_level);

    let source = BomSource::new(&settings.source)?;
    let table = bom::metric_table()?;
    Ok(agent::run_until_signal(source, table, settings.collector_config("bom")).await)
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
