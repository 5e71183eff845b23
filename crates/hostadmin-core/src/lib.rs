//! # hostadmin core
//!
//! Administrative lifecycle operations of a self-hosted server: provisioning,
//! main domain changes, package and application upgrades and major release
//! migration.
//!
//! Every operation takes an [`AdminContext`] carrying the configuration, the
//! calling [`Interface`] and the external collaborators, and a [`Journal`]
//! collecting the notifications meant for the administrator. Collaborators
//! are traits (see [`system`]) so operations run unchanged against the real
//! system or the in-memory doubles of the `test-utils` feature.

#![warn(missing_docs)]

pub mod bootstrap;
pub mod context;
pub mod deferred;
pub mod domain;
pub mod error;
pub mod fsutil;
pub mod journal;
pub mod migration;
pub mod postinstall;
pub mod steps;
pub mod system;
pub mod update;
pub mod upgrade;
pub mod zone;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bootstrap::{BootstrapReport, bootstrap_directory, change_admin_password};
pub use context::{AdminContext, Interface};
pub use domain::{MainDomain, MainDomainRequest, main_domain};
pub use error::{Error, ErrorKind, Result};
pub use journal::{Event, Journal, Level, MessageKey};
pub use migration::{MigrationReport, release_upgrade};
pub use postinstall::{PostinstallReport, PostinstallRequest, postinstall};
pub use update::{PendingUpdates, UpgradeOptions, check_updates};
pub use upgrade::{UpgradeReport, apply_upgrades};
