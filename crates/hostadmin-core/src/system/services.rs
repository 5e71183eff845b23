//! System services, firewall and SSO gateway

use async_trait::async_trait;
use command_executor::{Command, CommandRunner};
use hostadmin_config::ToolsConfig;
use std::sync::Arc;
use tracing::{debug, info};

use super::{framework_command, run_checked};
use crate::error::{Error, Result};

/// Service supervision
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Restart a service
    async fn restart(&self, service: &str) -> Result<()>;

    /// Start a service automatically at boot
    async fn enable_at_boot(&self, service: &str) -> Result<()>;

    /// The last `lines` lines of a service log
    async fn log_tail(&self, service: &str, lines: usize) -> Result<Vec<String>>;
}

/// Host firewall
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Enable UPnP port forwarding; with `defer_reload` the rules are not
    /// reloaded yet
    async fn enable_upnp(&self, defer_reload: bool) -> Result<()>;

    /// Reload the firewall rules
    async fn reload(&self) -> Result<()>;
}

/// Single sign-on gateway
#[async_trait]
pub trait SsoGateway: Send + Sync {
    /// Regenerate the gateway configuration
    async fn regenerate(&self) -> Result<()>;
}

/// Services handled through `service` and `update-rc.d`
pub struct SysvServiceManager {
    runner: Arc<dyn CommandRunner>,
    config: Arc<ToolsConfig>,
}

impl SysvServiceManager {
    /// Create a service manager
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<ToolsConfig>) -> Self {
        Self { runner, config }
    }

    /// Command restarting `service`
    pub fn restart_command(service: &str) -> Command {
        Command::builder("service").args([service, "restart"]).build()
    }

    /// Command enabling `service` at boot
    pub fn enable_command(service: &str) -> Command {
        Command::builder("update-rc.d").args([service, "defaults"]).build()
    }
}

#[async_trait]
impl ServiceManager for SysvServiceManager {
    async fn restart(&self, service: &str) -> Result<()> {
        run_checked(self.runner.as_ref(), &Self::restart_command(service)).await?;
        info!(service, "service restarted");
        Ok(())
    }

    async fn enable_at_boot(&self, service: &str) -> Result<()> {
        run_checked(self.runner.as_ref(), &Self::enable_command(service)).await?;
        debug!(service, "service enabled at boot");
        Ok(())
    }

    async fn log_tail(&self, service: &str, lines: usize) -> Result<Vec<String>> {
        if let Some(path) = self.config.services.logs.get(service) {
            let content = std::fs::read_to_string(path).map_err(Error::file(path))?;
            let all: Vec<&str> = content.lines().collect();
            let start = all.len().saturating_sub(lines);
            return Ok(all[start..].iter().map(|line| line.to_string()).collect());
        }

        let cmd = Command::builder("journalctl")
            .args(["-u", service, "-n"])
            .arg(lines.to_string())
            .args(["--no-pager", "-o", "cat"])
            .build();
        let output = run_checked(self.runner.as_ref(), &cmd).await?;
        Ok(output.stdout.lines().map(String::from).collect())
    }
}

/// Firewall managed by the framework CLI
pub struct FrameworkFirewall {
    runner: Arc<dyn CommandRunner>,
    config: Arc<ToolsConfig>,
}

impl FrameworkFirewall {
    /// Create a firewall client
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<ToolsConfig>) -> Self {
        Self { runner, config }
    }
}

#[async_trait]
impl Firewall for FrameworkFirewall {
    async fn enable_upnp(&self, defer_reload: bool) -> Result<()> {
        let mut cmd = framework_command(&self.config, &["firewall", "upnp", "enable"]);
        if defer_reload {
            cmd.arg("--no-refresh");
        }
        run_checked(self.runner.as_ref(), &cmd).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let cmd = framework_command(&self.config, &["firewall", "reload"]);
        run_checked(self.runner.as_ref(), &cmd).await?;
        Ok(())
    }
}

/// SSO gateway configured by the framework CLI
pub struct FrameworkSsoGateway {
    runner: Arc<dyn CommandRunner>,
    config: Arc<ToolsConfig>,
}

impl FrameworkSsoGateway {
    /// Create a gateway client
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<ToolsConfig>) -> Self {
        Self { runner, config }
    }
}

#[async_trait]
impl SsoGateway for FrameworkSsoGateway {
    async fn regenerate(&self) -> Result<()> {
        let cmd = framework_command(&self.config, &["app", "ssowatconf"]);
        run_checked(self.runner.as_ref(), &cmd).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_executor::testing::ScriptedRunner;
    use tempfile::TempDir;

    #[smol_potat::test]
    async fn test_log_tail_from_file() {
        let root = TempDir::new().unwrap();
        let mut config = ToolsConfig::default();
        config.rebase(root.path());
        let log = config.services.logs["yunohost-api"].clone();
        std::fs::create_dir_all(log.parent().unwrap()).unwrap();
        std::fs::write(&log, "one\ntwo\nthree\n").unwrap();

        let services = SysvServiceManager::new(Arc::new(ScriptedRunner::new()), Arc::new(config));
        assert_eq!(
            services.log_tail("yunohost-api", 2).await.unwrap(),
            vec!["two", "three"]
        );
        assert_eq!(services.log_tail("yunohost-api", 10).await.unwrap().len(), 3);
    }

    #[smol_potat::test]
    async fn test_log_tail_falls_back_to_journal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("journalctl", 0, "started\nlistening\n");
        let services = SysvServiceManager::new(runner.clone(), Arc::new(ToolsConfig::default()));

        let lines = services.log_tail("nginx", 5).await.unwrap();
        assert_eq!(lines, vec!["started", "listening"]);
        assert_eq!(
            runner.lines(),
            vec!["journalctl -u nginx -n 5 --no-pager -o cat"]
        );
    }

    #[smol_potat::test]
    async fn test_firewall_commands() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = Arc::new(ToolsConfig::default());
        let firewall = FrameworkFirewall::new(runner.clone(), config.clone());
        let sso = FrameworkSsoGateway::new(runner.clone(), config);

        firewall.enable_upnp(true).await.unwrap();
        firewall.reload().await.unwrap();
        sso.regenerate().await.unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "yunohost firewall upnp enable --no-refresh",
                "yunohost firewall reload",
                "yunohost app ssowatconf"
            ]
        );
    }
}
