//! # hostadmin configuration
//!
//! YAML configuration for the hostadmin tools.
//!
//! Every file path, service name and external endpoint the orchestrators touch
//! lives here, with defaults reproducing the stock server layout. A missing
//! configuration file is not an error: [`parser::load`] falls back to
//! [`ToolsConfig::default`].

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod parser;
pub mod scheme;

pub use scheme::{Attributes, LdapScheme};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Environment variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Configuration version
    pub version: String,

    /// Files and directories
    pub paths: Paths,

    /// Main domain handling
    pub domain: DomainSettings,

    /// Directory service access
    pub ldap: LdapSettings,

    /// Dynamic DNS registry
    pub dyndns: DyndnsSettings,

    /// Certificate authority generation
    pub ca: CaSettings,

    /// System services
    pub services: ServiceSettings,

    /// Package upgrades
    pub packages: PackageSettings,

    /// Release migration
    pub migration: MigrationSettings,

    /// Log file location
    pub logging: LoggingSettings,

    /// Command prefix of the management framework CLI (`yunohost`)
    pub framework_cli: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            paths: Paths::default(),
            domain: DomainSettings::default(),
            ldap: LdapSettings::default(),
            dyndns: DyndnsSettings::default(),
            ca: CaSettings::default(),
            services: ServiceSettings::default(),
            packages: PackageSettings::default(),
            migration: MigrationSettings::default(),
            logging: LoggingSettings::default(),
            framework_cli: vec!["yunohost".to_string()],
        }
    }
}

impl ToolsConfig {
    /// Re-root every absolute path under `root`
    ///
    /// Used to operate on a mounted system image, and by tests to confine all
    /// side effects to a temporary directory.
    pub fn rebase(&mut self, root: &Path) {
        let paths = &mut self.paths;
        for path in [
            &mut paths.current_host,
            &mut paths.installed_marker,
            &mut paths.apps_settings,
            &mut paths.app_catalog,
            &mut paths.certs,
            &mut paths.zones,
            &mut paths.ssowat_persistent,
            &mut paths.ssl_key_link,
            &mut paths.ssl_cert_link,
            &mut paths.nginx_conf,
            &mut paths.nginx_local_template,
            &mut paths.ldap_scheme,
            &mut paths.cron_dir,
            &mut paths.app_data,
            &mut self.ca.dir,
            &mut self.ca.trust_store_cert,
            &mut self.migration.sources_list,
            &mut self.migration.project_sources,
            &mut self.logging.dir,
        ] {
            *path = rebase_path(root, path);
        }
        for path in paths
            .required_dirs
            .iter_mut()
            .chain(self.domain.files.iter_mut())
            .chain(self.services.logs.values_mut())
        {
            *path = rebase_path(root, path);
        }
    }

    /// Zone file of `domain`
    pub fn zone_file(&self, domain: &str) -> PathBuf {
        self.paths.zones.join(format!("{}.zone", domain))
    }

    /// Directory holding the certificate material of `domain`
    pub fn cert_dir(&self, domain: &str) -> PathBuf {
        self.paths.certs.join(domain)
    }

    /// Per-domain proxy configuration directory
    pub fn nginx_domain_dir(&self, domain: &str) -> PathBuf {
        self.paths.nginx_conf.join(format!("{}.d", domain))
    }

    /// Distinguished name of the entry with relative name `rdn`
    pub fn dn(&self, rdn: &str) -> String {
        format!("{},{}", rdn, self.ldap.base_dn)
    }
}

fn rebase_path(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => path.to_path_buf(),
    }
}

/// Files and directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Single-line file holding the main domain
    pub current_host: PathBuf,
    /// Sentinel written once provisioning completed
    pub installed_marker: PathBuf,
    /// One directory per installed application instance
    pub apps_settings: PathBuf,
    /// Downloaded application catalogs (`*.json`)
    pub app_catalog: PathBuf,
    /// Per-domain certificate material
    pub certs: PathBuf,
    /// DNS zone files
    pub zones: PathBuf,
    /// Persistent SSO gateway rules
    pub ssowat_persistent: PathBuf,
    /// System TLS key symlink
    pub ssl_key_link: PathBuf,
    /// System TLS certificate symlink
    pub ssl_cert_link: PathBuf,
    /// Reverse proxy configuration root
    pub nginx_conf: PathBuf,
    /// Local proxy configuration copied into the main domain directory
    pub nginx_local_template: PathBuf,
    /// Declarative directory tree
    pub ldap_scheme: PathBuf,
    /// Task scheduler drop-in directory
    pub cron_dir: PathBuf,
    /// Directories created at provisioning
    pub required_dirs: Vec<PathBuf>,
    /// Application data directory
    pub app_data: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            current_host: "/etc/yunohost/current_host".into(),
            installed_marker: "/etc/yunohost/installed".into(),
            apps_settings: "/etc/yunohost/apps".into(),
            app_catalog: "/var/cache/yunohost/repo".into(),
            certs: "/etc/yunohost/certs".into(),
            zones: "/var/lib/bind".into(),
            ssowat_persistent: "/etc/ssowat/conf.json.persistent".into(),
            ssl_key_link: "/etc/ssl/private/yunohost_key.pem".into(),
            ssl_cert_link: "/etc/ssl/certs/yunohost_crt.pem".into(),
            nginx_conf: "/etc/nginx/conf.d".into(),
            nginx_local_template: "/usr/share/yunohost/yunohost-config/nginx/yunohost_local.conf"
                .into(),
            ldap_scheme: "/usr/share/yunohost/yunohost-config/moulinette/ldap_scheme.yml".into(),
            cron_dir: "/etc/cron.d".into(),
            required_dirs: vec![
                "/etc/yunohost/apps".into(),
                "/etc/yunohost/certs".into(),
                "/var/cache/yunohost/repo".into(),
                "/home/yunohost.backup".into(),
                "/home/yunohost.app".into(),
            ],
            app_data: "/home/yunohost.app".into(),
        }
    }
}

/// Main domain handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSettings {
    /// Placeholder domain the stock configuration ships with
    pub default_domain: String,
    /// Service subdomains moved between zones on rename
    pub main_subdomains: Vec<String>,
    /// Hostname applied when the system hostname has no domain part
    pub fallback_hostname: String,
    /// Path the SSO gateway redirects `/` to, appended to the domain
    pub admin_path: String,
    /// Files whose content carries the main domain
    pub files: Vec<PathBuf>,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            default_domain: "yunohost.org".to_string(),
            main_subdomains: vec!["pubsub".into(), "muc".into(), "vjud".into()],
            fallback_hostname: "yunohost.yunohost.org".to_string(),
            admin_path: "/yunohost/admin".to_string(),
            files: vec![
                "/etc/postfix/main.cf".into(),
                "/etc/metronome/metronome.cfg.lua".into(),
                "/etc/dovecot/dovecot.conf".into(),
                "/usr/share/yunohost/yunohost-config/others/startup".into(),
                "/etc/amavis/conf.d/05-node_id".into(),
                "/etc/amavis/conf.d/50-user".into(),
            ],
        }
    }
}

/// Directory service access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapSettings {
    /// Server URI
    pub uri: String,
    /// Base of the tree
    pub base_dn: String,
    /// Administrative account, relative to the base
    pub admin_rdn: String,
    /// Credential the freshly installed directory accepts
    pub bootstrap_password: String,
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            uri: "ldap://localhost:389".to_string(),
            base_dn: "dc=yunohost,dc=org".to_string(),
            admin_rdn: "cn=admin".to_string(),
            bootstrap_password: "yunohost".to_string(),
        }
    }
}

/// Dynamic DNS registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DyndnsSettings {
    /// Registry base URL
    pub url: String,
    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for DyndnsSettings {
    fn default() -> Self {
        Self {
            url: "https://dyndns.yunohost.org".to_string(),
            timeout: 30,
        }
    }
}

/// Certificate authority generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaSettings {
    /// CA working directory (`openssl.cnf`, `serial`, `index.txt`, `ca/`)
    pub dir: PathBuf,
    /// Domain written in the shipped `openssl.cnf`
    pub template_domain: String,
    /// Certificate validity
    pub validity_days: u32,
    /// Where the CA certificate is installed for the system trust store
    pub trust_store_cert: PathBuf,
}

impl Default for CaSettings {
    fn default() -> Self {
        Self {
            dir: "/usr/share/yunohost/yunohost-config/ssl/yunoCA".into(),
            template_domain: "yunohost.org".to_string(),
            validity_days: 3650,
            trust_store_cert: "/etc/ssl/certs/ca-yunohost_crt.pem".into(),
        }
    }
}

/// System services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Services restarted, in order, after a main domain change
    pub restart_order: Vec<String>,
    /// Firewall service enabled at boot
    pub firewall: String,
    /// Management API service
    pub api: String,
    /// Log file per service; others fall back to the journal
    pub logs: BTreeMap<String, PathBuf>,
    /// Lines of API log returned after an API-triggered upgrade
    pub api_log_lines: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        let mut logs = BTreeMap::new();
        logs.insert(
            "yunohost-api".to_string(),
            PathBuf::from("/var/log/yunohost/yunohost-api.log"),
        );
        Self {
            restart_order: ["metronome", "postfix", "dovecot", "amavis", "nginx"]
                .into_iter()
                .map(String::from)
                .collect(),
            firewall: "yunohost-firewall".to_string(),
            api: "yunohost-api".to_string(),
            logs,
            api_log_lines: 100,
        }
    }
}

/// Package upgrades
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    /// Packages whose upgrade may kill an API request in flight
    pub critical: Vec<String>,
    /// Name of the deferred job installing held-back critical packages
    pub deferred_job: String,
    /// Cron schedule of deferred jobs
    pub deferred_schedule: String,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            critical: [
                "moulinette",
                "moulinette-yunohost",
                "yunohost-admin",
                "yunohost-config-nginx",
                "ssowat",
                "python",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            deferred_job: "yunohost-upgrade".to_string(),
            deferred_schedule: "00 * * * *".to_string(),
        }
    }
}

/// Release migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Release name currently configured
    pub from_release: String,
    /// Release name migrated to
    pub to_release: String,
    /// System package source list
    pub sources_list: PathBuf,
    /// Project package source list
    pub project_sources: PathBuf,
    /// Project repository line written for the new release
    pub project_repository: String,
    /// Meta package pulling the project in
    pub meta_package: String,
    /// Packages removed by the migration
    pub deprecated: Vec<String>,
    /// Name of the deferred job restarting the API after reboot
    pub deferred_job: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            from_release: "wheezy".to_string(),
            to_release: "jessie".to_string(),
            sources_list: "/etc/apt/sources.list".into(),
            project_sources: "/etc/apt/sources.list.d/yunohost.list".into(),
            project_repository: "deb http://repo.yunohost.org/debian jessie stable".to_string(),
            meta_package: "yunohost".to_string(),
            deprecated: vec!["amavisd-new".to_string()],
            deferred_job: "yunohost-regenconf".to_string(),
        }
    }
}

/// Log file location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory of the tool's own log file
    pub dir: PathBuf,
    /// File name inside `dir`
    pub file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: "/var/log/yunohost".into(),
            file: "hostadmin.log".to_string(),
        }
    }
}
