use anyhow::Result;
use clap::Subcommand;
use hostadmin_core::domain::is_valid_domain;
use hostadmin_core::{MainDomainRequest, main_domain};

use super::{Outcome, Session};
use crate::render::Report;

#[derive(Subcommand, Debug)]
pub enum DomainAction {
    /// Print the current main domain
    Get,
    /// Switch to another main domain
    Set {
        /// New main domain
        new: String,

        /// Domain being replaced, defaults to the current one
        #[arg(long)]
        old: Option<String>,

        /// Subscribe the new domain to dynamic DNS when eligible
        #[arg(long)]
        dyndns: bool,
    },
}

pub async fn run(session: &mut Session, action: Option<DomainAction>) -> Outcome {
    let request = match action.unwrap_or(DomainAction::Get) {
        DomainAction::Get => MainDomainRequest::query(),
        DomainAction::Set { new, old, dyndns } => {
            authenticate_for_change(session, &new).await?;
            MainDomainRequest {
                old,
                new: Some(new),
                dyndns,
            }
        }
    };
    let result = main_domain(&session.ctx, &mut session.journal, request).await?;
    Ok(Report::MainDomain(result))
}

/// Empty or malformed domains are rejected by `main_domain` before any bind
/// is needed
async fn authenticate_for_change(session: &Session, new: &str) -> Result<()> {
    if !is_valid_domain(new) {
        return Ok(());
    }
    session.authenticate().await
}
