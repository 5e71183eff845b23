//! Installed applications and the application catalog

use async_trait::async_trait;
use command_executor::CommandRunner;
use hostadmin_config::ToolsConfig;
use serde::Serialize;
use serde_yaml::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{framework_command, run_checked};
use crate::error::{Error, Result};

/// Settings of one installed application instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstalledApp {
    /// Instance id, `<app>` or `<app>__<n>`
    pub id: String,
    /// Display label
    pub label: Option<String>,
    /// Installation timestamp (seconds since the epoch)
    pub install_time: Option<i64>,
    /// Last upgrade timestamp, absent until the first upgrade
    pub update_time: Option<i64>,
    /// Catalog revision the instance was installed or upgraded from
    pub last_update: Option<i64>,
}

/// Catalog metadata of an application
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogApp {
    /// Timestamp of the latest published revision
    pub last_update: Option<i64>,
    /// Source repository description
    pub git: Option<serde_json::Value>,
}

/// Application management
#[async_trait]
pub trait AppManager: Send + Sync {
    /// Download fresh catalogs
    async fn refresh_catalog(&self) -> Result<()>;

    /// Ids of every installed instance
    async fn installed_ids(&self) -> Result<Vec<String>>;

    /// Settings of one installed instance
    async fn installed_app(&self, id: &str) -> Result<InstalledApp>;

    /// Catalog entry of an application, by base id
    async fn catalog_app(&self, id: &str) -> Result<Option<CatalogApp>>;

    /// Upgrade every installed application
    async fn upgrade_all(&self) -> Result<()>;
}

/// Reads settings and catalogs from disk, delegates changes to the framework
pub struct LocalAppManager {
    runner: Arc<dyn CommandRunner>,
    config: Arc<ToolsConfig>,
}

impl LocalAppManager {
    /// Create an application manager
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<ToolsConfig>) -> Self {
        Self { runner, config }
    }
}

#[async_trait]
impl AppManager for LocalAppManager {
    async fn refresh_catalog(&self) -> Result<()> {
        let cmd = framework_command(&self.config, &["app", "fetchlist"]);
        run_checked(self.runner.as_ref(), &cmd)
            .await
            .map_err(|e| Error::App(e.to_string()))?;
        Ok(())
    }

    async fn installed_ids(&self) -> Result<Vec<String>> {
        let dir = &self.config.paths.apps_settings;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(Error::file(dir))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn installed_app(&self, id: &str) -> Result<InstalledApp> {
        let dir = self.config.paths.apps_settings.join(id);
        let mut app = parse_settings(id, &dir.join("settings.yml"))?;
        app.last_update = installed_revision(&dir.join("status.json"));
        Ok(app)
    }

    async fn catalog_app(&self, id: &str) -> Result<Option<CatalogApp>> {
        let dir = &self.config.paths.app_catalog;
        if !dir.exists() {
            return Ok(None);
        }
        let mut lists: Vec<_> = std::fs::read_dir(dir)
            .map_err(Error::file(dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        lists.sort();

        for path in lists {
            let content = std::fs::read_to_string(&path).map_err(Error::file(&path))?;
            let catalog: serde_json::Value = match serde_json::from_str(&content) {
                Ok(catalog) => catalog,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable catalog");
                    continue;
                }
            };
            if let Some(app) = catalog.get(id) {
                debug!(id, catalog = %path.display(), "catalog entry found");
                return Ok(Some(CatalogApp {
                    last_update: app.get("lastUpdate").and_then(json_timestamp),
                    git: app.get("git").cloned(),
                }));
            }
        }
        Ok(None)
    }

    async fn upgrade_all(&self) -> Result<()> {
        let cmd = framework_command(&self.config, &["app", "upgrade"]);
        run_checked(self.runner.as_ref(), &cmd)
            .await
            .map_err(|e| Error::App(e.to_string()))?;
        Ok(())
    }
}

fn parse_settings(id: &str, path: &Path) -> Result<InstalledApp> {
    let content = std::fs::read_to_string(path).map_err(Error::file(path))?;
    let settings: Value = serde_yaml::from_str(&content)?;
    Ok(InstalledApp {
        id: id.to_string(),
        label: settings
            .get("label")
            .and_then(Value::as_str)
            .map(String::from),
        install_time: settings.get("install_time").and_then(yaml_timestamp),
        update_time: settings.get("update_time").and_then(yaml_timestamp),
        last_update: None,
    })
}

/// `remote.lastUpdate` of an instance status file, when recorded
fn installed_revision(path: &Path) -> Option<i64> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(status) => status
            .get("remote")
            .and_then(|remote| remote.get("lastUpdate"))
            .and_then(json_timestamp),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable app status");
            None
        }
    }
}

fn yaml_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_timestamp(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_executor::testing::ScriptedRunner;
    use tempfile::TempDir;

    fn manager(root: &TempDir) -> (LocalAppManager, Arc<ScriptedRunner>) {
        let mut config = ToolsConfig::default();
        config.rebase(root.path());
        let runner = Arc::new(ScriptedRunner::new());
        (LocalAppManager::new(runner.clone(), Arc::new(config)), runner)
    }

    #[smol_potat::test]
    async fn test_reads_installed_settings() {
        let root = TempDir::new().unwrap();
        let (apps, _) = manager(&root);
        let dir = root.path().join("etc/yunohost/apps/wordpress__2");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("settings.yml"),
            "label: Blog\ninstall_time: 1400000000\nupdate_time: '1400000100'\n",
        )
        .unwrap();

        assert_eq!(apps.installed_ids().await.unwrap(), vec!["wordpress__2"]);
        let app = apps.installed_app("wordpress__2").await.unwrap();
        assert_eq!(app.label.as_deref(), Some("Blog"));
        assert_eq!(app.install_time, Some(1_400_000_000));
        assert_eq!(app.update_time, Some(1_400_000_100));
        assert_eq!(app.last_update, None);

        std::fs::write(
            dir.join("status.json"),
            r#"{"installed_at": 1400000000, "remote": {"type": "default", "lastUpdate": 1450000000}}"#,
        )
        .unwrap();
        let app = apps.installed_app("wordpress__2").await.unwrap();
        assert_eq!(app.last_update, Some(1_450_000_000));
    }

    #[smol_potat::test]
    async fn test_catalog_lookup() {
        let root = TempDir::new().unwrap();
        let (apps, _) = manager(&root);
        let dir = root.path().join("var/cache/yunohost/repo");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("yunohost.json"),
            r#"{"wordpress": {"lastUpdate": 1500000000, "git": {"url": "https://example.org/wp"}},
                "custom": {"manifest": {}}}"#,
        )
        .unwrap();

        let wp = apps.catalog_app("wordpress").await.unwrap().unwrap();
        assert_eq!(wp.last_update, Some(1_500_000_000));
        assert!(wp.git.is_some());

        let custom = apps.catalog_app("custom").await.unwrap().unwrap();
        assert_eq!(custom.last_update, None);

        assert!(apps.catalog_app("unknown").await.unwrap().is_none());
    }

    #[smol_potat::test]
    async fn test_upgrade_failure_is_app_error() {
        let root = TempDir::new().unwrap();
        let (apps, runner) = manager(&root);
        runner.fail_on("app upgrade");

        assert!(matches!(apps.upgrade_all().await, Err(Error::App(_))));
        apps.refresh_catalog().await.unwrap();
        assert_eq!(runner.lines(), vec!["yunohost app upgrade", "yunohost app fetchlist"]);
    }
}
