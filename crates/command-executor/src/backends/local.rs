//! Local process execution backend

use async_process::Stdio;
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::process::{ExitStatus, Output};
use crate::runner::CommandRunner;

/// Runs commands as child processes of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl LocalRunner {
    /// Create a new local runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn output(&self, command: &Command) -> Result<Output> {
        debug!(command = %command, "running command");

        let mut async_cmd = command.prepare();
        async_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let program = command.get_program().to_string_lossy().into_owned();
        let output = async_cmd
            .output()
            .await
            .map_err(|e| Error::from_spawn(program, e))?;

        let status = ExitStatus::from(output.status);
        trace!(command = %command, code = ?status.code, signal = ?status.signal, "command finished");

        Ok(Output {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
