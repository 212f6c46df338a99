//! Bounded execution of external commands
//!
//! Agents that read a sensor through a command-line utility run it as a
//! child process with a deadline, then parse its standard output. The child
//! is killed when the deadline passes or when the caller stops waiting.

mod command;
mod error;
mod parsers;

pub use command::{Command, CommandOutput};
pub use error::{ProcessError, ProcessResult};
pub use parsers::{FloatParser, LineParser, first_record};
