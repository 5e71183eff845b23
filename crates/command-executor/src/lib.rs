//! Runtime-agnostic command execution library
//!
//! This crate provides a small, clonable [`Command`] description and the
//! [`CommandRunner`] trait used to run it to completion. The [`LocalRunner`]
//! backend spawns real processes through `async-process`; the scripted runner
//! behind the `test-utils` feature records commands and answers with canned
//! exit codes.

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod process;
pub mod runner;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backends::LocalRunner;
pub use command::{Command, CommandBuilder};
pub use error::{Error, Result};
pub use process::{ExitStatus, Output};
pub use runner::CommandRunner;
