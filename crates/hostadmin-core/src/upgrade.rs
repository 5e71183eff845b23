//! Package and application upgrades

use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::context::AdminContext;
use crate::deferred::DeferredJob;
use crate::error::Result;
use crate::fsutil::write_atomic;
use crate::journal::{Journal, Level, MessageKey};
use crate::system::ChangeSet;
use crate::update::UpgradeOptions;

/// What an upgrade did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    /// The package transaction failed
    pub packages_failed: bool,
    /// Upgrading applications failed
    pub apps_failed: bool,
    /// Critical packages left for the deferred job
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub held_back: Vec<String>,
    /// Deferred job installing the held-back packages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deferred_job: Option<PathBuf>,
    /// Tail of the management API log, API calls only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<String>>,
}

impl UpgradeReport {
    /// Whether every requested upgrade went through
    pub fn succeeded(&self) -> bool {
        !self.packages_failed && !self.apps_failed
    }
}

/// Keep the critical packages of `changes` and return their names in
/// simulation order
pub fn hold_critical(changes: &mut ChangeSet, critical: &[String]) -> Vec<String> {
    let names: Vec<String> = changes
        .changes
        .iter()
        .filter(|change| critical.contains(&change.name))
        .map(|change| change.name.clone())
        .collect();
    for name in &names {
        changes.keep(name);
    }
    names
}

/// Upgrade system packages and installed applications
///
/// Failures of either half are reported as notifications and in the report;
/// the other half still runs. When called through the API, packages whose
/// upgrade would restart the API itself are postponed to a deferred job.
pub async fn apply_upgrades(
    ctx: &AdminContext,
    journal: &mut Journal,
    options: UpgradeOptions,
) -> Result<UpgradeReport> {
    let config = &ctx.config;
    let mut report = UpgradeReport::default();

    if !options.ignore_packages {
        let mut changes = ctx.packages.simulate_upgrade().await?;

        if ctx.is_api() {
            report.held_back = hold_critical(&mut changes, &config.packages.critical);
            if !report.held_back.is_empty() {
                journal.emit(
                    Level::Info,
                    MessageKey::PackagesUpgradeCriticalLater,
                    [("packages", report.held_back.join(", "))],
                );
                let job = DeferredJob::new(
                    config.packages.deferred_job.as_str(),
                    config.packages.deferred_schedule.as_str(),
                    format!("apt-get install {} -y", report.held_back.join(" ")),
                );
                let path = job.path(config);
                write_atomic(&path, job.render(config).as_bytes())?;
                info!(job = %path.display(), "critical packages deferred");
                report.deferred_job = Some(path);
            }
        }

        if changes.is_empty() {
            journal.info(MessageKey::PackagesNoUpgrade);
        } else {
            journal.info(MessageKey::UpgradingPackages);
            match ctx.packages.commit(&changes).await {
                Ok(()) => journal.info(MessageKey::Done),
                Err(e) => {
                    error!(error = %e, "unable to upgrade packages");
                    report.packages_failed = true;
                    journal.error(MessageKey::PackagesUpgradeFailed);
                }
            }
        }
    }

    if !options.ignore_apps {
        if let Err(e) = ctx.apps.upgrade_all().await {
            error!(error = %e, "unable to upgrade apps");
            report.apps_failed = true;
            journal.error(MessageKey::AppUpgradeFailed);
        }
    }

    if report.succeeded() {
        journal.success(MessageKey::SystemUpgraded);
    }

    if ctx.is_api() {
        let service = &config.services.api;
        match ctx
            .services
            .log_tail(service, config.services.api_log_lines)
            .await
        {
            Ok(lines) => report.log = Some(lines),
            Err(e) => warn!(%service, error = %e, "API log unavailable"),
        }
    }

    Ok(report)
}
