//! Output side of the agents: collectd `PUTVAL` lines
use log::trace;
use std::fmt;
use std::io::{self, Stdout, Write};

use crate::collector::PutvalValue;
use crate::error::{AgentError, Result};

/// One metric sample in collectd's exec plain-text protocol
#[derive(Debug, Clone, PartialEq)]
pub struct PutvalRecord {
    /// Rendered metric identifier
    pub name: String,
    /// Polling interval in seconds
    pub interval_secs: u64,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub value: PutvalValue,
}

impl fmt::Display for PutvalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PUTVAL \"{}\" interval={} {}:{}",
            self.name, self.interval_secs, self.timestamp, self.value
        )
    }
}

/// Destination for emitted records
pub trait MetricSink: Send + 'static {
    /// Write one record; it must reach the consumer before this returns
    fn emit(&mut self, record: &PutvalRecord) -> Result<()>;

    /// Flush and stop accepting records
    fn close(&mut self) -> Result<()>;
}

/// Writes one line per record to any writer, flushing after each line
pub struct LineSink<W: Write> {
    writer: W,
    written: u64,
    closed: bool,
}

impl LineSink<Stdout> {
    /// Sink on the process's standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            closed: false,
        }
    }

    /// Number of records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write + Send + 'static> MetricSink for LineSink<W> {
    fn emit(&mut self, record: &PutvalRecord) -> Result<()> {
        if self.closed {
            return Err(AgentError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sink is closed",
            )));
        }
        trace!("{}", record);
        writeln!(self.writer, "{}", record)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush()?;
        Ok(())
    }
}
