//! Directory bootstrap and admin credential

use hostadmin_config::LdapScheme;
use serde::Serialize;
use tracing::{error, info};

use crate::context::AdminContext;
use crate::error::{Error, Result};
use crate::journal::{Journal, MessageKey};
use crate::steps::{Plan, Step, StepRunner};
use crate::system::DirectoryEntry;

/// Entries touched by a bootstrap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Entries created by this run
    pub created: Vec<String>,
    /// Entries already present
    pub skipped: Vec<String>,
}

/// Plan creating every scheme entry, parents first, then the admin account
pub fn bootstrap_plan(scheme: &LdapScheme, admin: DirectoryEntry) -> Plan {
    Plan::new("ldap-init", MessageKey::LdapInitFailed)
        .steps(
            scheme
                .entries()
                .map(|(rdn, attributes)| Step::EnsureEntry(DirectoryEntry::new(rdn, attributes.clone()))),
        )
        .step(Step::UpsertEntry(admin))
}

/// Populate the directory from the declarative scheme
///
/// Requires an authenticated directory. Entries that exist are left alone;
/// the admin entry is always brought to its fixed attribute set.
pub async fn bootstrap_directory(ctx: &AdminContext, journal: &mut Journal) -> Result<BootstrapReport> {
    let scheme = LdapScheme::from_file(&ctx.config.paths.ldap_scheme)?;
    let admin = DirectoryEntry::admin(&ctx.config.ldap.admin_rdn, &ctx.config.ldap.bootstrap_password);
    let plan = bootstrap_plan(&scheme, admin);

    let outcome = StepRunner::new(ctx).execute(&plan).await?;

    let rdn_of = |index: &usize| match &plan.steps[*index] {
        Step::EnsureEntry(entry) | Step::UpsertEntry(entry) => Some(entry.rdn.clone()),
        _ => None,
    };
    let report = BootstrapReport {
        created: outcome.applied.iter().filter_map(rdn_of).collect(),
        skipped: outcome.skipped.iter().filter_map(rdn_of).collect(),
    };
    info!(
        created = report.created.len(),
        skipped = report.skipped.len(),
        "directory bootstrapped"
    );
    journal.success(MessageKey::LdapInitialized);
    Ok(report)
}

/// Change the credential of the admin entry
pub async fn change_admin_password(
    ctx: &AdminContext,
    journal: &mut Journal,
    password: &str,
) -> Result<()> {
    if password.is_empty() {
        return Err(Error::invalid_argument(
            MessageKey::AdminPasswordChangeFailed,
            "the new password is empty",
        ));
    }

    if let Err(e) = ctx
        .directory
        .change_credential(&ctx.config.ldap.admin_rdn, password)
        .await
    {
        error!(error = %e, "unable to change admin password");
        return Err(Error::PermissionDenied {
            key: MessageKey::AdminPasswordChangeFailed,
            reason: e.to_string(),
        });
    }

    journal.success(MessageKey::AdminPasswordChanged);
    Ok(())
}
