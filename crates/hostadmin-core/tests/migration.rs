//! Major release migration

use hostadmin_core::testing::TestBed;
use hostadmin_core::{Journal, Level, MessageKey, release_upgrade};

#[smol_potat::test]
async fn test_migration_then_reboot() {
    let bed = TestBed::new();
    let config = bed.config.clone();
    let mut journal = Journal::new();

    let report = release_upgrade(&bed.context(), &mut journal).await;

    assert_eq!(report.steps, 12);
    assert!(report.failures.is_empty());
    assert_eq!(
        bed.read(&config.migration.sources_list),
        "deb http://ftp.debian.org/debian jessie main\n"
    );
    assert_eq!(
        bed.read(&config.migration.project_sources),
        "deb http://repo.yunohost.org/debian jessie stable\n"
    );
    let job = bed.read(&config.paths.cron_dir.join("yunohost-regenconf"));
    assert!(job.contains("systemctl start yunohost-api && rm -f "));

    let lines = bed.runner.lines();
    assert_eq!(lines.last().map(String::as_str), Some("reboot"));
    assert!(lines.iter().any(|l| l.ends_with("remove amavisd-new")));
    assert_eq!(journal.level_of(MessageKey::SystemUpgraded), Some(Level::Success));
    assert_eq!(journal.keys().last(), Some(&MessageKey::SystemRebooting));
}

#[smol_potat::test]
async fn test_migration_pushes_through_failures() {
    let bed = TestBed::new();
    bed.runner.fail_on("dist-upgrade");
    bed.runner.fail_on("regen-conf");
    let mut journal = Journal::new();

    let report = release_upgrade(&bed.context(), &mut journal).await;

    let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![6, 9]);
    assert!(bed.runner.ran("autoremove"));
    assert!(bed.config.paths.cron_dir.join("yunohost-regenconf").exists());
    assert_eq!(bed.runner.lines().last().map(String::as_str), Some("reboot"));
    assert!(!journal.contains(MessageKey::SystemUpgraded));
    let errors = journal
        .events()
        .iter()
        .filter(|e| e.key == MessageKey::MigrationStepFailed)
        .count();
    assert_eq!(errors, 2);
}

#[smol_potat::test]
async fn test_failed_reboot_is_reported_after_plan_steps() {
    let bed = TestBed::new();
    bed.runner.fail_on("reboot");

    let report = release_upgrade(&bed.context(), &mut Journal::new()).await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 11);
    assert_eq!(report.failures[0].step, "run `reboot`");
}
