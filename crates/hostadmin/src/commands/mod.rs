//! Subcommand implementations

use anyhow::{Context, Result};
use hostadmin_core::{AdminContext, Journal};

use crate::render::Report;

pub mod directory;
pub mod domain;
pub mod migrate;
pub mod postinstall;
pub mod update;

/// State shared by every subcommand of one invocation
pub struct Session {
    pub ctx: AdminContext,
    pub journal: Journal,
    pub admin_password: Option<String>,
}

impl Session {
    pub fn new(ctx: AdminContext, admin_password: Option<String>) -> Self {
        Self {
            ctx,
            journal: Journal::new(),
            admin_password,
        }
    }

    /// Bind to the directory as admin
    ///
    /// Without an explicit password the bootstrap credential is tried, which
    /// only works before provisioning changed it.
    pub async fn authenticate(&self) -> Result<()> {
        let password = self
            .admin_password
            .as_deref()
            .unwrap_or(&self.ctx.config.ldap.bootstrap_password);
        self.ctx
            .directory
            .authenticate(password)
            .await
            .context("Directory authentication failed")
    }
}

/// Result of a subcommand
pub type Outcome = Result<Report>;
