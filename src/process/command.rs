use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, trace};
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::process::{ProcessError, ProcessResult};

/// Command wrapper for process execution
#[derive(Debug, Clone)]
pub struct Command {
    /// Program to execute
    program: String,

    /// Arguments to pass to the program
    args: Vec<String>,
}

/// Captured output of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Command {
    /// Create a new command
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Run the command to completion, capturing stdout and stderr.
    ///
    /// The child is killed if it is still running after `limit`, or if the
    /// returned future is dropped first. A non-zero exit is an error.
    pub async fn output(&self, limit: Duration) -> ProcessResult<CommandOutput> {
        debug!("Running command: {} {:?}", self.program, self.args);

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ProcessError::SpawnError {
            program: self.program.clone(),
            source,
        })?;

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ProcessError::ReadError(e)),
            Err(_) => return Err(ProcessError::Timeout(limit)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stderr.lines() {
            debug!("[{}] stderr: {}", self.program, line);
        }
        trace!("[{}] stdout: {:?}", self.program, stdout);

        if !output.status.success() {
            return Err(ProcessError::NonZeroExit(output.status));
        }

        Ok(CommandOutput {
            status: output.status,
            stdout,
            stderr,
        })
    }
}
