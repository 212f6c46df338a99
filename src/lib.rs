//! Polling agents that feed readings to collectd's exec plugin
//!
//! Every agent runs the same loop: fetch from one source under a timeout,
//! map the values through a fixed metric table, and print one `PUTVAL` line
//! per metric to stdout.

pub mod agent;
pub mod collector;
pub mod config;
pub mod error;
pub mod output;
pub mod process;
pub mod shutdown;
pub mod sources;
pub mod util;

pub use util::logging::init as init_logging;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::collector::{
        AbsentValue, CollectorConfig, CollectorConfigBuilder, CollectorLoop, MetricDescriptor,
        MetricTable, Reading, Source,
    };
    pub use crate::config::{AgentSettings, ConfigBuilder, LogLevel};
    pub use crate::error::{AgentError, ExitStatus, Result};
    pub use crate::output::{LineSink, MetricSink, PutvalRecord};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
