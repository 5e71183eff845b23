use std::fmt;

use hostadmin_core::release_upgrade;

use super::{Outcome, Session};
use crate::render::Report;

/// The operator did not confirm a release upgrade
#[derive(Debug)]
pub struct NotConfirmed;

impl fmt::Display for NotConfirmed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("release-upgrade replaces package sources and reboots; pass --yes to proceed")
    }
}

impl std::error::Error for NotConfirmed {}

pub async fn run(session: &mut Session, confirmed: bool) -> Outcome {
    if !confirmed {
        return Err(NotConfirmed.into());
    }
    let report = release_upgrade(&session.ctx, &mut session.journal).await;
    Ok(Report::Migration(report))
}
