use clap::Args;
use hostadmin_core::{UpgradeOptions, apply_upgrades, check_updates};

use super::{Outcome, Session};
use crate::render::Report;

#[derive(Args, Debug, Clone, Copy)]
pub struct Scope {
    /// Leave applications alone
    #[arg(long)]
    pub ignore_apps: bool,

    /// Leave system packages alone
    #[arg(long)]
    pub ignore_packages: bool,
}

impl From<Scope> for UpgradeOptions {
    fn from(scope: Scope) -> Self {
        Self {
            ignore_apps: scope.ignore_apps,
            ignore_packages: scope.ignore_packages,
        }
    }
}

pub async fn check(session: &mut Session, scope: Scope) -> Outcome {
    let pending = check_updates(&session.ctx, &mut session.journal, scope.into()).await?;
    Ok(Report::Updates(pending))
}

pub async fn upgrade(session: &mut Session, scope: Scope) -> Outcome {
    let report = apply_upgrades(&session.ctx, &mut session.journal, scope.into()).await?;
    Ok(Report::Upgrade(report))
}
