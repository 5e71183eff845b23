use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hostadmin_config::{ConfigError, ToolsConfig, parser};
use hostadmin_core::{AdminContext, ErrorKind, Interface};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

mod commands;
mod logging;
mod messages;
mod render;

use commands::Session;
use commands::domain::DomainAction;
use commands::migrate::NotConfirmed;
use commands::update::Scope;
use render::OutputFormat;

#[derive(Parser)]
#[command(name = "hostadmin")]
#[command(about = "Server administration: provisioning, main domain and upgrades")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        env = "HOSTADMIN_CONFIG",
        default_value = "/etc/yunohost/hostadmin.yml"
    )]
    config: PathBuf,

    /// Operate on a system mounted under this directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// More log output, repeat for trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Front end the operation runs for
    #[arg(long, global = true, value_enum, default_value_t = InterfaceArg::Cli)]
    interface: InterfaceArg,

    /// Current admin password for directory changes
    #[arg(long, global = true, env = "HOSTADMIN_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum InterfaceArg {
    Cli,
    Api,
}

impl From<InterfaceArg> for Interface {
    fn from(arg: InterfaceArg) -> Self {
        match arg {
            InterfaceArg::Cli => Interface::Cli,
            InterfaceArg::Api => Interface::Api,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the main domain
    DomainMain {
        #[command(subcommand)]
        action: Option<DomainAction>,
    },

    /// Provision a freshly installed server
    Postinstall {
        /// Main domain
        domain: String,

        /// New admin password
        password: String,

        /// Do not query or subscribe to dynamic DNS
        #[arg(long)]
        ignore_dyndns: bool,
    },

    /// Refresh package lists and show pending updates
    Update {
        #[command(flatten)]
        scope: Scope,
    },

    /// Upgrade system packages and applications
    Upgrade {
        #[command(flatten)]
        scope: Scope,
    },

    /// Populate the directory from the LDAP scheme
    LdapInit,

    /// Change the admin password
    AdminPassword {
        /// New password
        new_password: String,
    },

    /// Migrate to the next major release and reboot
    ReleaseUpgrade {
        /// Confirm the upgrade
        #[arg(long)]
        yes: bool,
    },
}

fn load_config(path: &Path, root: Option<&Path>) -> Result<ToolsConfig> {
    let mut config = parser::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    if let Some(root) = root {
        config.rebase(root);
    }
    Ok(config)
}

async fn dispatch(session: &mut Session, command: Commands) -> commands::Outcome {
    match command {
        Commands::DomainMain { action } => commands::domain::run(session, action).await,
        Commands::Postinstall {
            domain,
            password,
            ignore_dyndns,
        } => commands::postinstall::run(session, domain, password, ignore_dyndns).await,
        Commands::Update { scope } => commands::update::check(session, scope).await,
        Commands::Upgrade { scope } => commands::update::upgrade(session, scope).await,
        Commands::LdapInit => commands::directory::init(session).await,
        Commands::AdminPassword { new_password } => {
            commands::directory::change_password(session, &new_password).await
        }
        Commands::ReleaseUpgrade { yes } => commands::migrate::run(session, yes).await,
    }
}

/// Process exit status of a failed command
fn exit_code(error: &anyhow::Error) -> u8 {
    if let Some(e) = error.downcast_ref::<hostadmin_core::Error>() {
        return match e.kind() {
            ErrorKind::InvalidArgument => 22,
            ErrorKind::AlreadyInstalled | ErrorKind::AlreadyExists => 17,
            ErrorKind::CacheRefresh | ErrorKind::Permission | ErrorKind::Other => 1,
        };
    }
    if error.downcast_ref::<ConfigError>().is_some() || error.downcast_ref::<NotConfirmed>().is_some() {
        return 22;
    }
    1
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config, cli.root.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", render::describe(&e));
            return ExitCode::from(exit_code(&e));
        }
    };
    let _guard = logging::init(&config.logging, logging::level_for(cli.verbose, cli.quiet));
    debug!(config = %cli.config.display(), root = ?cli.root, "configuration loaded");

    let ctx = AdminContext::system(config, cli.interface.into());
    let mut session = Session::new(ctx, cli.admin_password);

    let outcome = smol::block_on(dispatch(&mut session, cli.command));
    let printed = match &outcome {
        Ok(report) => render::success(cli.output, &session.journal, report),
        Err(e) => render::failure(cli.output, &session.journal, e),
    };
    if let Err(e) = printed {
        eprintln!("Error: failed to print output: {:#}", e);
    }

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(exit_code(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use hostadmin_core::MessageKey;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_codes() {
        let invalid = anyhow::Error::new(hostadmin_core::Error::invalid_argument(
            MessageKey::NewDomainRequired,
            "missing",
        ));
        assert_eq!(exit_code(&invalid), 22);
        assert_eq!(exit_code(&anyhow::Error::new(hostadmin_core::Error::AlreadyInstalled)), 17);
        assert_eq!(
            exit_code(&anyhow::Error::new(hostadmin_core::Error::DyndnsUnavailable(
                "a.nohost.me".into()
            ))),
            17
        );
        assert_eq!(exit_code(&anyhow::Error::new(hostadmin_core::Error::CacheRefresh)), 1);
        assert_eq!(exit_code(&anyhow::Error::new(NotConfirmed)), 22);
    }

    #[test]
    fn test_parse_domain_set() {
        let cli = Cli::try_parse_from([
            "hostadmin",
            "domain-main",
            "set",
            "example.org",
            "--dyndns",
        ])
        .unwrap();
        match cli.command {
            Commands::DomainMain {
                action: Some(DomainAction::Set { new, old, dyndns }),
            } => {
                assert_eq!(new, "example.org");
                assert_eq!(old, None);
                assert!(dyndns);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn test_parse_upgrade_scope_and_interface() {
        let cli = Cli::try_parse_from([
            "hostadmin",
            "--interface",
            "api",
            "upgrade",
            "--ignore-apps",
        ])
        .unwrap();
        assert!(matches!(cli.interface, InterfaceArg::Api));
        match cli.command {
            Commands::Upgrade { scope } => {
                assert!(scope.ignore_apps);
                assert!(!scope.ignore_packages);
            }
            _ => panic!("unexpected command"),
        }
    }
}
