//! System package manager

use async_trait::async_trait;
use command_executor::{Command, CommandRunner};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use super::run_checked;
use crate::error::{Error, Result};

static INST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Inst (\S+) (?:\[(\S+)\] )?\((\S+)[^\[)]*(?:\[([^\]]+)\])?\)")
        .expect("valid simulation pattern")
});

/// Environment and options for unattended dpkg runs
pub(crate) const NONINTERACTIVE_ENV: [(&str, &str); 2] = [
    ("DEBIAN_FRONTEND", "noninteractive"),
    ("DEBIAN_PRIORITY", "critical"),
];

pub(crate) const KEEP_CONFIG_OPTIONS: [&str; 4] = [
    "-o",
    "Dpkg::Options::=--force-confdef",
    "-o",
    "Dpkg::Options::=--force-confold",
];

/// A package the full upgrade would install or upgrade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageChange {
    /// Package name
    pub name: String,
    /// Name qualified with the architecture when known
    pub fullname: String,
    /// Installed version, `None` for new packages
    pub current: Option<String>,
    /// Version the upgrade installs
    pub candidate: String,
}

/// Result of a simulated full upgrade, with per-package keep marks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Every change of the simulation
    pub changes: Vec<PackageChange>,
    /// Packages left at their installed version on commit
    pub kept: BTreeSet<String>,
}

impl ChangeSet {
    /// Create a change set without keep marks
    pub fn new(changes: Vec<PackageChange>) -> Self {
        Self {
            changes,
            kept: BTreeSet::new(),
        }
    }

    /// Mark `name` as kept; returns false when it is not part of the set
    pub fn keep(&mut self, name: &str) -> bool {
        if self.changes.iter().any(|change| change.name == name) {
            self.kept.insert(name.to_string());
            true
        } else {
            false
        }
    }

    /// Changes a commit would apply
    pub fn pending(&self) -> impl Iterator<Item = &PackageChange> {
        self.changes
            .iter()
            .filter(|change| !self.kept.contains(&change.name))
    }

    /// Whether a commit would change nothing
    pub fn is_empty(&self) -> bool {
        self.pending().next().is_none()
    }
}

/// Package index, simulation and upgrade
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Refresh the package index from the configured sources
    async fn refresh_index(&self) -> Result<()>;

    /// Simulate a full upgrade
    async fn simulate_upgrade(&self) -> Result<ChangeSet>;

    /// Changelog of the candidate version
    async fn changelog(&self, change: &PackageChange) -> Result<String>;

    /// Apply a change set, honouring its keep marks
    async fn commit(&self, changes: &ChangeSet) -> Result<()>;
}

/// APT driven through `apt-get` and `apt-mark`
pub struct AptPackageManager {
    runner: Arc<dyn CommandRunner>,
}

impl AptPackageManager {
    /// Create a package manager
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn apt_mark(action: &str, packages: &BTreeSet<String>) -> Command {
        Command::builder("apt-mark").arg(action).args(packages).build()
    }
}

/// Parse the `Inst` lines of `apt-get -s` output
pub fn parse_simulation(output: &str) -> Vec<PackageChange> {
    output
        .lines()
        .filter_map(|line| INST_LINE.captures(line))
        .map(|caps| {
            let raw = &caps[1];
            let (name, arch) = match raw.split_once(':') {
                Some((name, arch)) => (name, Some(arch)),
                None => (raw, caps.get(4).map(|m| m.as_str())),
            };
            let fullname = match arch {
                Some(arch) => format!("{}:{}", name, arch),
                None => name.to_string(),
            };
            PackageChange {
                name: name.to_string(),
                fullname,
                current: caps.get(2).map(|m| m.as_str().to_string()),
                candidate: caps[3].to_string(),
            }
        })
        .collect()
}

#[async_trait]
impl PackageManager for AptPackageManager {
    async fn refresh_index(&self) -> Result<()> {
        let cmd = Command::builder("apt-get").arg("update").build();
        run_checked(self.runner.as_ref(), &cmd)
            .await
            .map_err(|e| Error::Package(e.to_string()))?;
        Ok(())
    }

    async fn simulate_upgrade(&self) -> Result<ChangeSet> {
        let cmd = Command::builder("apt-get")
            .args(["-s", "dist-upgrade"])
            .env("LC_ALL", "C")
            .build();
        let output = run_checked(self.runner.as_ref(), &cmd)
            .await
            .map_err(|e| Error::Package(e.to_string()))?;
        let changes = parse_simulation(&output.stdout);
        debug!(count = changes.len(), "simulated full upgrade");
        Ok(ChangeSet::new(changes))
    }

    async fn changelog(&self, change: &PackageChange) -> Result<String> {
        let cmd = Command::builder("apt-get")
            .arg("changelog")
            .arg(format!("{}={}", change.name, change.candidate))
            .build();
        let output = run_checked(self.runner.as_ref(), &cmd)
            .await
            .map_err(|e| Error::Package(e.to_string()))?;
        Ok(output.stdout)
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<()> {
        if !changes.kept.is_empty() {
            run_checked(self.runner.as_ref(), &Self::apt_mark("hold", &changes.kept))
                .await
                .map_err(|e| Error::Package(e.to_string()))?;
        }

        let mut upgrade = Command::new("apt-get");
        upgrade.args(["-y", "-q"]).args(KEEP_CONFIG_OPTIONS).arg("dist-upgrade");
        for (key, value) in NONINTERACTIVE_ENV {
            upgrade.env(key, value);
        }
        let result = run_checked(self.runner.as_ref(), &upgrade).await;

        if !changes.kept.is_empty() {
            let unhold = Self::apt_mark("unhold", &changes.kept);
            if let Err(e) = run_checked(self.runner.as_ref(), &unhold).await {
                warn!(error = %e, "failed to release package holds");
            }
        }

        result.map_err(|e| Error::Package(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_executor::testing::ScriptedRunner;

    const SIMULATION: &str = "\
Reading package lists...
Building dependency tree...
The following packages will be upgraded:
  moulinette nginx-common
Inst nginx-common [1.2.1-2.2+wheezy3] (1.2.1-2.2+wheezy4 Debian-Security:7.0/oldstable [all])
Inst moulinette [2.2.0] (2.2.1 YunoHost:stable [all])
Inst libfoo2:amd64 (2.0-1 Debian:7.11/oldstable [amd64])
Conf nginx-common (1.2.1-2.2+wheezy4 Debian-Security:7.0/oldstable [all])
";

    fn change(name: &str) -> PackageChange {
        PackageChange {
            name: name.to_string(),
            fullname: name.to_string(),
            current: None,
            candidate: "1".to_string(),
        }
    }

    #[test]
    fn test_parse_simulation() {
        let changes = parse_simulation(SIMULATION);
        assert_eq!(changes.len(), 3);

        assert_eq!(changes[0].name, "nginx-common");
        assert_eq!(changes[0].fullname, "nginx-common:all");
        assert_eq!(changes[0].current.as_deref(), Some("1.2.1-2.2+wheezy3"));
        assert_eq!(changes[0].candidate, "1.2.1-2.2+wheezy4");

        assert_eq!(changes[2].name, "libfoo2");
        assert_eq!(changes[2].fullname, "libfoo2:amd64");
        assert_eq!(changes[2].current, None);
    }

    #[test]
    fn test_keep_marks() {
        let mut set = ChangeSet::new(vec![change("ssowat"), change("nginx")]);
        assert!(set.keep("ssowat"));
        assert!(!set.keep("python"));

        let pending: Vec<_> = set.pending().map(|c| c.name.as_str()).collect();
        assert_eq!(pending, vec!["nginx"]);
        assert!(!set.is_empty());

        set.keep("nginx");
        assert!(set.is_empty());
    }

    #[smol_potat::test]
    async fn test_commit_holds_kept_packages() {
        let runner = Arc::new(ScriptedRunner::new());
        let apt = AptPackageManager::new(runner.clone());
        let mut set = ChangeSet::new(vec![change("ssowat"), change("nginx")]);
        set.keep("ssowat");

        apt.commit(&set).await.unwrap();

        let lines = runner.lines();
        assert_eq!(lines[0], "apt-mark hold ssowat");
        assert!(lines[1].starts_with("apt-get -y -q -o"));
        assert!(lines[1].ends_with("dist-upgrade"));
        assert_eq!(lines[2], "apt-mark unhold ssowat");
    }

    #[smol_potat::test]
    async fn test_commit_failure_still_releases_holds() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_on("dist-upgrade");
        let apt = AptPackageManager::new(runner.clone());
        let mut set = ChangeSet::new(vec![change("python")]);
        set.keep("python");

        assert!(matches!(apt.commit(&set).await, Err(Error::Package(_))));
        assert!(runner.ran("apt-mark unhold python"));
    }

    #[smol_potat::test]
    async fn test_changelog_targets_candidate() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("apt-get changelog", 0, "nginx (1) stable; urgency=low\n");
        let apt = AptPackageManager::new(runner.clone());

        let text = apt.changelog(&change("nginx")).await.unwrap();
        assert!(text.starts_with("nginx (1)"));
        assert!(runner.ran("apt-get changelog nginx=1"));
    }
}
