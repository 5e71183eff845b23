use hostadmin_core::{bootstrap_directory, change_admin_password};

use super::{Outcome, Session};
use crate::render::Report;

pub async fn init(session: &mut Session) -> Outcome {
    session.authenticate().await?;
    let report = bootstrap_directory(&session.ctx, &mut session.journal).await?;
    Ok(Report::Bootstrap(report))
}

pub async fn change_password(session: &mut Session, new_password: &str) -> Outcome {
    session.authenticate().await?;
    change_admin_password(&session.ctx, &mut session.journal, new_password).await?;
    Ok(Report::Nothing)
}
