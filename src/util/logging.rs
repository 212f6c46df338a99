use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

use crate::config::LogLevel;

fn level_filter(level: &LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Initialize the logging system.
///
/// Logs go to stderr; stdout is reserved for `PUTVAL` records. Calling this
/// more than once keeps the first configuration.
pub fn init(level: &LogLevel) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Stderr)
        .filter(None, level_filter(level));

    if builder.try_init().is_err() {
        log::debug!("Logger already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_filter(&LogLevel::Warn), LevelFilter::Warn);
        assert_eq!(level_filter(&LogLevel::Trace), LevelFilter::Trace);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(&LogLevel::Error);
        init(&LogLevel::Debug);
    }
}
