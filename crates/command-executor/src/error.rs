//! Error types for command execution

use thiserror::Error;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn `{program}`: {reason}")]
    SpawnFailed {
        /// The program that could not be started
        program: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// Command not found
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found
        command: String,
    },

    /// No scripted response and no default configured (test runner only)
    #[error("unexpected command: {command}")]
    Unexpected {
        /// The command line that had no scripted outcome
        command: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Build the right variant from a spawn-time I/O error
    pub fn from_spawn(program: impl Into<String>, err: std::io::Error) -> Self {
        let program = program.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::CommandNotFound { command: program }
        } else {
            Self::spawn_failed(program, err.to_string())
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
