use chrono::Utc;
use log::{debug, error, info, trace, warn};
use std::time::Instant;
use tokio::time::{self, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;

use super::config::CollectorConfig;
use super::core::Source;
use super::metric::{MetricTable, PutvalValue, Reading};
use crate::error::{AgentError, Result};
use crate::output::{MetricSink, PutvalRecord};

/// Lifecycle of a collector loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Source not opened yet
    Init,
    /// Ticking
    Running,
    /// Releasing the source and the sink
    Draining,
    /// Terminal
    Stopped,
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Polls a [`Source`] at a fixed interval and writes one record per metric
/// to a [`MetricSink`].
///
/// The loop owns both ends exclusively. [`CollectorLoop::run`] always leaves
/// the loop in [`LoopState::Stopped`] with the source closed, whatever the
/// reason it returned.
pub struct CollectorLoop<S: Source, K: MetricSink> {
    source: S,
    sink: K,
    table: MetricTable,
    keys: Vec<String>,
    config: CollectorConfig,
    state: LoopState,
    session_open: bool,
    clock: Clock,
}

impl<S: Source, K: MetricSink> CollectorLoop<S, K> {
    /// Create a new collector loop
    pub fn new(source: S, sink: K, table: MetricTable, config: CollectorConfig) -> Result<Self> {
        table.validate(config.plugin.as_deref())?;
        if config.interval.is_zero() {
            return Err(AgentError::Config(format!(
                "collector {} needs a non-zero interval",
                config.name
            )));
        }
        let keys = table.keys();

        Ok(Self {
            source,
            sink,
            table,
            keys,
            config,
            state: LoopState::Init,
            session_open: false,
            clock: Box::new(|| Utc::now().timestamp()),
        })
    }

    /// Replace the wall clock used for record timestamps
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Open the source session, bounded by the fetch timeout
    pub async fn open(&mut self) -> Result<()> {
        if self.state != LoopState::Init {
            return Err(AgentError::Other(format!(
                "cannot open collector {} in state {:?}",
                self.config.name, self.state
            )));
        }

        info!("Opening source {}", self.source.name());
        match timeout(self.config.fetch_timeout, self.source.open()).await {
            Ok(Ok(())) => {
                self.session_open = true;
                self.state = LoopState::Running;
                Ok(())
            }
            Ok(Err(AgentError::Setup(reason))) => Err(AgentError::Setup(reason)),
            Ok(Err(e)) => Err(AgentError::Setup(format!(
                "failed to open {}: {}",
                self.source.name(),
                e
            ))),
            Err(_) => Err(AgentError::Setup(format!(
                "{} did not open within {:?}",
                self.source.name(),
                self.config.fetch_timeout
            ))),
        }
    }

    /// Fetch once and write one record per metric.
    ///
    /// Returns the number of records written. A fetch that exceeds the
    /// timeout, or fails with a non-soft error, writes nothing.
    pub async fn tick(&mut self) -> Result<usize> {
        if self.state != LoopState::Running {
            return Err(AgentError::Other(format!(
                "cannot tick collector {} in state {:?}",
                self.config.name, self.state
            )));
        }

        let reading = self.fetch().await?;
        let timestamp = (self.clock)();
        self.emit_reading(&reading, timestamp)
    }

    async fn fetch(&mut self) -> Result<Reading> {
        let started = Instant::now();
        let fetch_timeout = self.config.fetch_timeout;

        match timeout(fetch_timeout, self.source.fetch(&self.keys)).await {
            Ok(Ok(reading)) => {
                debug!(
                    "Fetched {} values from {} in {:?}",
                    reading.len(),
                    self.source.name(),
                    started.elapsed()
                );
                Ok(reading)
            }
            Ok(Err(e)) if e.is_soft() => {
                warn!(
                    "Fetch from {} failed, reporting absent values: {}",
                    self.source.name(),
                    e
                );
                Ok(Reading::absent(self.table.len()))
            }
            Ok(Err(e)) => {
                error!("Fetch from {} failed: {}", self.source.name(), e);
                Err(e)
            }
            Err(_) => {
                error!(
                    "Fetch from {} exceeded {:?}, giving up",
                    self.source.name(),
                    fetch_timeout
                );
                Err(AgentError::Timeout(format!(
                    "fetch from {} exceeded {:?}",
                    self.source.name(),
                    fetch_timeout
                )))
            }
        }
    }

    /// Write `reading` as one record per metric, in table order
    pub fn emit_reading(&mut self, reading: &Reading, timestamp: i64) -> Result<usize> {
        if reading.len() > self.table.len() {
            debug!(
                "Ignoring {} surplus values from {}",
                reading.len() - self.table.len(),
                self.source.name()
            );
        }

        let interval_secs = self.config.interval.as_secs();
        let mut written = 0;
        for (index, descriptor) in self.table.iter().enumerate() {
            let record = PutvalRecord {
                name: descriptor.render_name(&self.config.host, self.config.plugin.as_deref()),
                interval_secs,
                timestamp,
                value: PutvalValue::from_reading(reading.get(index), self.config.absent_value),
            };
            self.sink.emit(&record)?;
            written += 1;
        }

        Ok(written)
    }

    /// Run until `shutdown` is cancelled or a fatal error occurs.
    ///
    /// Returns `Ok(())` on a clean stop and the fatal error otherwise. The
    /// loop is shut down before this returns in both cases.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let result = self.drive(&shutdown).await;

        if let Err(e) = &result {
            error!("Collector {} stopping: {}", self.config.name, e);
        } else {
            info!("Collector {} interrupted, shutting down", self.config.name);
        }

        self.shutdown().await;
        result
    }

    async fn drive(&mut self, shutdown: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            opened = self.open() => opened?,
        }

        info!(
            "Collector {} running every {:?} ({} metrics)",
            self.config.name,
            self.config.interval,
            self.table.len()
        );

        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Abandoning in-flight fetch from {}", self.source.name());
                    return Ok(());
                }
                written = self.tick() => {
                    trace!("Tick wrote {} records", written?);
                }
            }
        }
    }

    /// Stop ticking, close the source session and close the sink.
    ///
    /// Failures are logged. Calling this again is a no-op.
    pub async fn shutdown(&mut self) {
        if matches!(self.state, LoopState::Draining | LoopState::Stopped) {
            debug!("Collector {} already shut down", self.config.name);
            return;
        }
        self.state = LoopState::Draining;

        if self.session_open {
            self.session_open = false;
            match timeout(self.config.close_timeout, self.source.close()).await {
                Ok(Ok(())) => debug!("Closed source {}", self.source.name()),
                Ok(Err(e)) => warn!("Error closing source {}: {}", self.source.name(), e),
                Err(_) => warn!(
                    "Closing source {} exceeded {:?}",
                    self.source.name(),
                    self.config.close_timeout
                ),
            }
        }

        if let Err(e) = self.sink.close() {
            warn!("Error closing output for {}: {}", self.config.name, e);
        }

        self.state = LoopState::Stopped;
    }
}
