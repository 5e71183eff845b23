//! Pending updates and upgrades

use hostadmin_core::system::{CatalogApp, InstalledApp};
use hostadmin_core::testing::TestBed;
use hostadmin_core::{
    ErrorKind, Journal, Level, MessageKey, UpgradeOptions, apply_upgrades, check_updates,
};

fn installed(id: &str, install_time: Option<i64>, update_time: Option<i64>) -> InstalledApp {
    InstalledApp {
        id: id.into(),
        label: Some(format!("{} label", id)),
        install_time,
        update_time,
        last_update: None,
    }
}

fn catalog(last_update: i64) -> CatalogApp {
    CatalogApp {
        last_update: Some(last_update),
        git: Some(serde_json::json!({"url": "https://git.example.org/app", "revision": "HEAD"})),
    }
}

#[smol_potat::test]
async fn test_check_lists_packages_and_apps() {
    let bed = TestBed::new();
    bed.packages.offer(&["nginx", "ssowat"]);
    bed.apps.install(installed("wordpress", Some(100), None));
    bed.apps.install(installed("wordpress__2", Some(100), Some(500)));
    bed.apps.install(installed("ghost", None, None));
    bed.apps.install(installed("unlisted", Some(1), None));
    bed.apps.publish("wordpress", catalog(300));
    bed.apps.publish("ghost", catalog(300));
    let before = bed.snapshot();
    let mut journal = Journal::new();

    let updates = check_updates(&bed.context(), &mut journal, UpgradeOptions::default())
        .await
        .unwrap();

    let packages: Vec<&str> = updates.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(packages, vec!["nginx", "ssowat"]);
    assert_eq!(updates.packages[0].fullname, "nginx:amd64");
    assert!(updates.packages[0].changelog.starts_with("nginx (2)"));
    let apps: Vec<&str> = updates.apps.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(apps, vec!["wordpress"]);
    assert_eq!(updates.apps[0].label, "wordpress label");

    assert_eq!(bed.snapshot(), before);
    assert!(bed.packages.committed().is_empty());
    assert_eq!(bed.apps.upgrades(), 0);
    assert_eq!(
        journal.keys(),
        vec![MessageKey::UpdatingAptCache, MessageKey::Done]
    );
}

#[smol_potat::test]
async fn test_check_refresh_failure() {
    let bed = TestBed::new();
    bed.packages.fail_refresh();

    let err = check_updates(&bed.context(), &mut Journal::new(), UpgradeOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CacheRefresh);
    assert_eq!(err.message_key(), Some(MessageKey::UpdateCacheFailed));
}

#[smol_potat::test]
async fn test_check_nothing_pending() {
    let bed = TestBed::new();
    let mut journal = Journal::new();

    let updates = check_updates(&bed.context(), &mut journal, UpgradeOptions::default())
        .await
        .unwrap();

    assert!(updates.is_empty());
    assert_eq!(journal.level_of(MessageKey::PackagesNoUpgrade), Some(Level::Info));
}

#[smol_potat::test]
async fn test_check_tolerates_changelog_and_catalog_failures() {
    let bed = TestBed::new();
    bed.packages.offer(&["nginx"]);
    bed.packages.fail_changelog();
    bed.apps.fail_refresh();
    bed.apps.install(installed("wordpress", Some(100), None));
    bed.apps.publish("wordpress", catalog(300));

    let updates = check_updates(&bed.context(), &mut Journal::new(), UpgradeOptions::default())
        .await
        .unwrap();

    assert_eq!(updates.packages[0].changelog, "");
    assert_eq!(updates.apps.len(), 1);
    assert_eq!(bed.apps.refreshes(), 1);
}

#[smol_potat::test]
async fn test_check_ignore_flags() {
    let bed = TestBed::new();
    bed.packages.offer(&["nginx"]);
    let options = UpgradeOptions {
        ignore_packages: true,
        ignore_apps: true,
    };

    let updates = check_updates(&bed.context(), &mut Journal::new(), options)
        .await
        .unwrap();

    assert!(updates.is_empty());
    assert_eq!(bed.packages.refreshes(), 0);
    assert_eq!(bed.apps.refreshes(), 0);
}

#[smol_potat::test]
async fn test_upgrade_from_cli_commits_everything() {
    let bed = TestBed::new();
    bed.packages.offer(&["nginx", "ssowat"]);
    let mut journal = Journal::new();

    let report = apply_upgrades(&bed.context(), &mut journal, UpgradeOptions::default())
        .await
        .unwrap();

    assert!(report.succeeded());
    assert!(report.held_back.is_empty());
    assert!(report.deferred_job.is_none());
    assert!(report.log.is_none());
    let committed = bed.packages.committed();
    assert_eq!(committed[0].pending().count(), 2);
    assert_eq!(bed.apps.upgrades(), 1);
    assert_eq!(journal.level_of(MessageKey::SystemUpgraded), Some(Level::Success));
}

#[smol_potat::test]
async fn test_upgrade_from_api_defers_critical_packages() {
    let bed = TestBed::new();
    bed.packages.offer(&["nginx", "ssowat", "python"]);
    let log: Vec<String> = (0..150).map(|i| format!("line {i}")).collect();
    bed.services.set_log("yunohost-api", log);
    let mut journal = Journal::new();

    let report = apply_upgrades(&bed.api_context(), &mut journal, UpgradeOptions::default())
        .await
        .unwrap();

    assert_eq!(report.held_back, vec!["ssowat", "python"]);
    let pending: Vec<String> = bed.packages.committed()[0]
        .pending()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(pending, vec!["nginx"]);

    let job = report.deferred_job.clone().unwrap();
    assert_eq!(job, bed.config.paths.cron_dir.join("yunohost-upgrade"));
    let cron = bed.read(&job);
    assert!(cron.contains(" root PATH="));
    assert!(cron.contains("apt-get install ssowat python -y && rm -f "));

    let event = journal
        .events()
        .iter()
        .find(|e| e.key == MessageKey::PackagesUpgradeCriticalLater)
        .unwrap();
    assert_eq!(event.params["packages"], "ssowat, python");

    let log = report.log.unwrap();
    assert_eq!(log.len(), 100);
    assert_eq!(log.last().map(String::as_str), Some("line 149"));
}

#[smol_potat::test]
async fn test_upgrade_package_failure_still_upgrades_apps() {
    let bed = TestBed::new();
    bed.packages.offer(&["nginx"]);
    bed.packages.fail_commit();
    let mut journal = Journal::new();

    let report = apply_upgrades(&bed.context(), &mut journal, UpgradeOptions::default())
        .await
        .unwrap();

    assert!(report.packages_failed);
    assert!(!report.apps_failed);
    assert_eq!(bed.apps.upgrades(), 1);
    assert_eq!(journal.level_of(MessageKey::PackagesUpgradeFailed), Some(Level::Error));
    assert!(!journal.contains(MessageKey::SystemUpgraded));
}

#[smol_potat::test]
async fn test_upgrade_app_failure_is_reported() {
    let bed = TestBed::new();
    bed.apps.fail_upgrade();
    let mut journal = Journal::new();

    let report = apply_upgrades(&bed.context(), &mut journal, UpgradeOptions::default())
        .await
        .unwrap();

    assert!(report.apps_failed);
    assert!(!report.succeeded());
    assert!(journal.contains(MessageKey::PackagesNoUpgrade));
    assert!(journal.contains(MessageKey::AppUpgradeFailed));
    assert!(bed.packages.committed().is_empty());
}
