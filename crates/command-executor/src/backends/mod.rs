//! Backend implementations for different execution contexts
//!
//! Only local execution is provided. Callers that need another context (a chroot,
//! a remote host) implement [`CommandRunner`](crate::CommandRunner) themselves.

pub mod local;
pub use local::LocalRunner;
