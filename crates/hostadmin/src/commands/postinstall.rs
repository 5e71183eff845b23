use hostadmin_core::{PostinstallRequest, postinstall};

use super::{Outcome, Session};
use crate::render::Report;

pub async fn run(session: &mut Session, domain: String, password: String, ignore_dyndns: bool) -> Outcome {
    let request = PostinstallRequest {
        domain,
        password,
        ignore_dyndns,
    };
    let report = postinstall(&session.ctx, &mut session.journal, request).await?;
    Ok(Report::Postinstall(report))
}
