//! Major release migration
//!
//! Every step runs even when an earlier one failed: once the package sources
//! point at the new release, stopping half-way leaves the system in a worse
//! state than pushing through. Failures are collected and reported.

use command_executor::Command;
use hostadmin_config::ToolsConfig;
use serde::Serialize;
use tracing::{info, warn};

use crate::context::AdminContext;
use crate::deferred::DeferredJob;
use crate::journal::{Journal, Level, MessageKey};
use crate::steps::{Plan, Step, StepFailure, StepRunner};
use crate::system::framework_command;
use crate::system::packages::{KEEP_CONFIG_OPTIONS, NONINTERACTIVE_ENV};

/// What the migration did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Number of steps run, reboot included
    pub steps: usize,
    /// Steps that failed
    pub failures: Vec<StepFailure>,
}

/// An unattended `apt-get` run with the given arguments
fn apt(args: &[&str], keep_config: bool) -> Command {
    let mut cmd = Command::new("apt-get");
    cmd.args(["-y", "--force-yes", "-qq"]);
    if keep_config {
        cmd.args(KEEP_CONFIG_OPTIONS);
    }
    cmd.args(args);
    for (key, value) in NONINTERACTIVE_ENV {
        cmd.env(key, value);
    }
    cmd
}

/// Steps moving the system to the next release, reboot excluded
pub fn migration_plan(config: &ToolsConfig) -> Plan {
    let migration = &config.migration;
    let update = || Step::Run(Command::builder("apt-get").arg("update").build());

    let mut remove = vec!["remove"];
    remove.extend(migration.deprecated.iter().map(String::as_str));

    let api_start = DeferredJob::new(
        migration.deferred_job.as_str(),
        config.packages.deferred_schedule.as_str(),
        format!("systemctl start {}", config.services.api),
    );

    Plan::new("release-upgrade", MessageKey::MigrationStepFailed)
        .step(update())
        .step(Step::Run(apt(&["upgrade"], true)))
        .step(Step::Render {
            from: migration.sources_list.clone(),
            to: migration.sources_list.clone(),
            needle: migration.from_release.clone(),
            replacement: migration.to_release.clone(),
        })
        .step(Step::WriteFile {
            path: migration.project_sources.clone(),
            contents: format!("{}\n", migration.project_repository),
        })
        .step(update())
        .step(Step::Run(apt(&["install", migration.meta_package.as_str()], true)))
        .step(Step::Run(apt(&["dist-upgrade"], true)))
        .steps((!migration.deprecated.is_empty()).then(|| Step::Run(apt(&remove, false))))
        .step(Step::Run(apt(&["autoremove"], false)))
        .step(Step::Run(framework_command(config, &["service", "regen-conf", "-f"])))
        .step(api_start.step(config))
}

/// Migrate to the next major release, then reboot
pub async fn release_upgrade(ctx: &AdminContext, journal: &mut Journal) -> MigrationReport {
    let config = &ctx.config;
    let steps = StepRunner::new(ctx);

    let plan = migration_plan(config);
    let mut outcome = steps.execute_best_effort(&plan).await;

    for failure in &outcome.failures {
        journal.emit(
            Level::Error,
            MessageKey::MigrationStepFailed,
            [
                ("index", failure.index.to_string()),
                ("step", failure.step.clone()),
            ],
        );
    }
    if outcome.failures.is_empty() {
        journal.success(MessageKey::SystemUpgraded);
    } else {
        warn!(failed = outcome.failures.len(), "migration finished with failures");
    }

    journal.info(MessageKey::SystemRebooting);
    let reboot = Plan::new("reboot", MessageKey::MigrationStepFailed)
        .step(Step::Run(Command::new("reboot")));
    let rebooted = steps.execute_best_effort(&reboot).await;
    outcome.failures.extend(rebooted.failures.into_iter().map(|mut failure| {
        failure.index += plan.steps.len();
        failure
    }));

    info!("release migration done");
    MigrationReport {
        steps: plan.steps.len() + reboot.steps.len(),
        failures: outcome.failures,
    }
}
