//! Execution context shared by every operation

use command_executor::{CommandRunner, LocalRunner};
use hostadmin_config::ToolsConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::system::{
    AppManager, AptPackageManager, Directory, DirectoryDomainRegistry, DomainRegistry,
    DyndnsRegistry, Firewall, FrameworkFirewall, FrameworkSsoGateway, HttpDyndnsRegistry,
    LdapDirectory, LocalAppManager, PackageManager, ServiceManager, SsoGateway,
    SysvServiceManager,
};

/// Which front end triggered the operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    /// Interactive command line
    #[default]
    Cli,
    /// Management API; the process serving it may be restarted by upgrades
    Api,
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => f.write_str("cli"),
            Self::Api => f.write_str("api"),
        }
    }
}

/// Configuration, calling interface and collaborators of one invocation
#[derive(Clone)]
pub struct AdminContext {
    /// Tool configuration
    pub config: Arc<ToolsConfig>,
    /// Calling interface
    pub interface: Interface,
    /// Runs plain system commands
    pub runner: Arc<dyn CommandRunner>,
    /// Directory service
    pub directory: Arc<dyn Directory>,
    /// Hosted domains
    pub domains: Arc<dyn DomainRegistry>,
    /// Installed applications
    pub apps: Arc<dyn AppManager>,
    /// Dynamic DNS registry
    pub dyndns: Arc<dyn DyndnsRegistry>,
    /// System packages
    pub packages: Arc<dyn PackageManager>,
    /// System services
    pub services: Arc<dyn ServiceManager>,
    /// Host firewall
    pub firewall: Arc<dyn Firewall>,
    /// Single sign-on gateway
    pub sso: Arc<dyn SsoGateway>,
}

impl AdminContext {
    /// Wire the collaborators that act on the running system
    pub fn system(config: ToolsConfig, interface: Interface) -> Self {
        let config = Arc::new(config);
        let runner: Arc<dyn CommandRunner> = Arc::new(LocalRunner::new());
        let directory: Arc<dyn Directory> =
            Arc::new(LdapDirectory::new(runner.clone(), config.ldap.clone()));

        Self {
            interface,
            domains: Arc::new(DirectoryDomainRegistry::new(directory.clone())),
            apps: Arc::new(LocalAppManager::new(runner.clone(), config.clone())),
            dyndns: Arc::new(HttpDyndnsRegistry::new(runner.clone(), config.clone())),
            packages: Arc::new(AptPackageManager::new(runner.clone())),
            services: Arc::new(SysvServiceManager::new(runner.clone(), config.clone())),
            firewall: Arc::new(FrameworkFirewall::new(runner.clone(), config.clone())),
            sso: Arc::new(FrameworkSsoGateway::new(runner.clone(), config.clone())),
            directory,
            runner,
            config,
        }
    }

    /// The same context for another calling interface
    pub fn with_interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    /// Whether the operation was triggered through the management API
    pub fn is_api(&self) -> bool {
        self.interface == Interface::Api
    }
}
