//! External collaborators
//!
//! Each submodule declares one collaborator trait next to the implementation
//! that drives the real system, usually through the management framework CLI
//! or a standard system tool. Orchestrators only see the traits.

pub mod apps;
pub mod directory;
pub mod domains;
pub mod dyndns;
pub mod ldif;
pub mod packages;
pub mod services;

pub use apps::{AppManager, CatalogApp, InstalledApp, LocalAppManager};
pub use directory::{Directory, DirectoryEntry, LdapDirectory};
pub use domains::{DirectoryDomainRegistry, DomainRegistry};
pub use dyndns::{DyndnsRegistry, HttpDyndnsRegistry, parent_zone};
pub use packages::{AptPackageManager, ChangeSet, PackageChange, PackageManager};
pub use services::{
    Firewall, FrameworkFirewall, FrameworkSsoGateway, ServiceManager, SsoGateway,
    SysvServiceManager,
};

use command_executor::{Command, CommandRunner, Output};
use hostadmin_config::ToolsConfig;

use crate::error::{Error, Result};

/// Run `command`, turning a non-zero exit into [`Error::CommandFailed`]
pub(crate) async fn run_checked(runner: &dyn CommandRunner, command: &Command) -> Result<Output> {
    let output = runner.output(command).await?;
    if !output.status.success() {
        return Err(Error::command_failed(command, &output));
    }
    Ok(output)
}

/// A management framework CLI invocation such as `yunohost app fetchlist`
pub(crate) fn framework_command(config: &ToolsConfig, args: &[&str]) -> Command {
    let mut command =
        Command::from_argv(&config.framework_cli).unwrap_or_else(|| Command::new("yunohost"));
    command.args(args);
    command
}
