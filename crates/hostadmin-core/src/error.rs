//! Error types for hostadmin-core

use command_executor::{Command, Output};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::journal::MessageKey;

/// Result type alias for hostadmin-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Provisioning was attempted on an installed system
    #[error("the system is already installed")]
    AlreadyInstalled,

    /// A required argument is missing or empty
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Localisation key
        key: MessageKey,
        /// What is wrong
        message: String,
    },

    /// The dynamic DNS registry refuses the requested domain
    #[error("dynamic DNS domain {0} is not available")]
    DyndnsUnavailable(String),

    /// The package index could not be refreshed
    #[error("failed to refresh the package cache")]
    CacheRefresh,

    /// A step of an ordered plan failed; earlier steps stay applied
    #[error("{plan}: step {index} ({step}) failed: {reason}")]
    StepFailed {
        /// Plan name
        plan: String,
        /// Zero-based index of the failing step
        index: usize,
        /// Description of the failing step
        step: String,
        /// Underlying failure
        reason: String,
        /// Localisation key of the plan failure
        key: MessageKey,
    },

    /// The directory refused an administrative change
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Localisation key
        key: MessageKey,
        /// Underlying failure
        reason: String,
    },

    /// An external command exited unsuccessfully
    #[error("`{command}` exited with code {code:?}{detail}")]
    CommandFailed {
        /// Rendered command line
        command: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// First line of stderr, prefixed with `: ` when present
        detail: String,
    },

    /// A directory entry exists already
    #[error("directory entry {0} already exists")]
    EntryExists(String),

    /// A directory operation failed
    #[error("directory operation on {rdn} failed: {reason}")]
    Directory {
        /// Entry concerned
        rdn: String,
        /// Underlying failure
        reason: String,
    },

    /// Directory writes attempted before authenticating
    #[error("not authenticated to the directory")]
    NotAuthenticated,

    /// Package manager failure
    #[error("package manager: {0}")]
    Package(String),

    /// Application manager failure
    #[error("application manager: {0}")]
    App(String),

    /// Network failure talking to a remote registry
    #[error("network error: {0}")]
    Network(String),

    /// File system failure on a known path
    #[error("{}: {source}", path.display())]
    File {
        /// Path concerned
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] hostadmin_config::ConfigError),

    /// Command could not be run at all
    #[error("command execution error: {0}")]
    Command(#[from] command_executor::Error),

    /// Serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract error taxonomy, independent of the concrete failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Provisioning attempted twice
    AlreadyInstalled,
    /// Missing or invalid input, raised before any mutation
    InvalidArgument,
    /// Requested name already taken
    AlreadyExists,
    /// Package index fetch failed
    CacheRefresh,
    /// An external command or transaction failed mid-sequence
    Permission,
    /// Anything else
    Other,
}

impl Error {
    /// Build a [`Error::CommandFailed`] from a finished command
    pub fn command_failed(command: &Command, output: &Output) -> Self {
        let detail = output
            .stderr
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| format!(": {}", line))
            .unwrap_or_default();
        Self::CommandFailed {
            command: command.to_string(),
            code: output.status.code,
            detail,
        }
    }

    /// Closure wrapping an I/O error with the path it concerns
    pub fn file(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::File {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(key: MessageKey, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            key,
            message: message.into(),
        }
    }

    /// Create a directory error
    pub fn directory(rdn: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Directory {
            rdn: rdn.into(),
            reason: reason.into(),
        }
    }

    /// Where this error sits in the taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInstalled => ErrorKind::AlreadyInstalled,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::DyndnsUnavailable(_) | Self::EntryExists(_) => ErrorKind::AlreadyExists,
            Self::CacheRefresh => ErrorKind::CacheRefresh,
            Self::StepFailed { .. }
            | Self::PermissionDenied { .. }
            | Self::CommandFailed { .. }
            | Self::NotAuthenticated => ErrorKind::Permission,
            _ => ErrorKind::Other,
        }
    }

    /// Localisation key describing this error to an administrator
    pub fn message_key(&self) -> Option<MessageKey> {
        match self {
            Self::AlreadyInstalled => Some(MessageKey::YunohostAlreadyInstalled),
            Self::DyndnsUnavailable(_) => Some(MessageKey::DyndnsUnavailable),
            Self::CacheRefresh => Some(MessageKey::UpdateCacheFailed),
            Self::InvalidArgument { key, .. }
            | Self::StepFailed { key, .. }
            | Self::PermissionDenied { key, .. } => Some(*key),
            _ => None,
        }
    }
}
