//! The runner trait every execution backend implements

use async_trait::async_trait;

use crate::command::Command;
use crate::error::Result;
use crate::process::{ExitStatus, Output};

/// Something that can run a [`Command`] to completion
///
/// Implementations block the calling task until the process exits. There is no
/// streaming or cancellation: administrative commands are short-lived and their
/// outcome is only meaningful once they have finished.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and capture its output
    async fn output(&self, command: &Command) -> Result<Output>;

    /// Run the command and only report how it exited
    async fn status(&self, command: &Command) -> Result<ExitStatus> {
        Ok(self.output(command).await?.status)
    }
}
