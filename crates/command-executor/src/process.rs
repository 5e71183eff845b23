//! Process outcome types

use serde::{Deserialize, Serialize};

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// A status with the given exit code
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        self.signal.is_some()
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }
}

/// Captured output of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// How the process ended
    pub status: ExitStatus,
    /// Everything written to stdout, lossily decoded
    pub stdout: String,
    /// Everything written to stderr, lossily decoded
    pub stderr: String,
}

impl Output {
    /// Output of a process that exited with `code` and printed `stdout`
    pub fn with_code(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            status: ExitStatus::from_code(code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_only_on_zero() {
        assert!(ExitStatus::from_code(0).success());
        assert!(!ExitStatus::from_code(1).success());
        let killed = ExitStatus {
            code: None,
            signal: Some(9),
        };
        assert!(!killed.success());
        assert!(killed.terminated_by_signal());
    }
}
