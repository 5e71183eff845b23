//! Main domain management

use command_executor::Command;
use hostadmin_config::ToolsConfig;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::context::AdminContext;
use crate::error::{Error, Result};
use crate::fsutil::write_atomic;
use crate::journal::{Journal, MessageKey};
use crate::steps::{Plan, Step, StepRunner};
use crate::system::parent_zone;
use crate::zone;

/// Arguments of a main domain query or change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainDomainRequest {
    /// Domain being replaced; read from the current-host file when absent
    pub old: Option<String>,
    /// Domain to switch to; absent together with `old` means "query"
    pub new: Option<String>,
    /// Subscribe the new domain to dynamic DNS when eligible
    pub dyndns: bool,
}

impl MainDomainRequest {
    /// A read-only query of the current main domain
    pub fn query() -> Self {
        Self::default()
    }

    /// A change to `new`
    pub fn set(new: impl Into<String>) -> Self {
        Self {
            new: Some(new.into()),
            ..Self::default()
        }
    }
}

/// Outcome of [`main_domain`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MainDomain {
    /// Nothing changed
    Current {
        /// The main domain
        current_main_domain: String,
    },
    /// The main domain was switched
    Changed {
        /// Previous main domain
        old: String,
        /// New main domain
        new: String,
    },
}

/// First line of the current-host file
pub fn read_current_domain(config: &ToolsConfig) -> Result<String> {
    let path = &config.paths.current_host;
    let content = std::fs::read_to_string(path).map_err(Error::file(path))?;
    Ok(content.lines().next().unwrap_or_default().trim_end().to_string())
}

/// Replace every occurrence of `old` with `new`
///
/// This is a literal substring replacement: `old` also matches inside
/// longer names (`mail.old.example`) and is never interpreted as a pattern.
pub fn rewrite_domain(content: &str, old: &str, new: &str) -> String {
    content.replace(old, new)
}

/// Rewrite one file of the domain file set, keeping its permissions
///
/// Returns whether the file existed.
pub fn rewrite_file(path: &Path, old: &str, new: &str) -> Result<bool> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::file(path)(e)),
    };
    write_atomic(path, rewrite_domain(&content, old, new).as_bytes())?;
    Ok(true)
}

/// Whether `domain` is a host name: dot-separated labels of letters, digits
/// and inner hyphens
pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253
        && domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

pub(crate) fn check_domain(domain: &str) -> Result<()> {
    if is_valid_domain(domain) {
        Ok(())
    } else {
        Err(Error::invalid_argument(
            MessageKey::DomainNameInvalid,
            format!("{:?} is not a valid domain name", domain),
        ))
    }
}

/// Key and certificate of `domain`, signed by the local certificate authority
///
/// Everything is written to the domain's certificate directory; `ca.pem`
/// links to the authority certificate in the trust store.
pub fn certificate_plan(config: &ToolsConfig, domain: &str) -> Plan {
    let dir = config.cert_dir(domain);
    let cnf = dir.join("openssl.cnf");
    let csr = dir.join("csr.pem");
    let key = dir.join("key.pem");
    let crt = dir.join("crt.pem");
    let days = config.ca.validity_days.to_string();

    let request = Command::builder("openssl")
        .args(["req", "-new", "-config"])
        .arg(&cnf)
        .arg("-days")
        .arg(&days)
        .arg("-out")
        .arg(&csr)
        .arg("-keyout")
        .arg(&key)
        .args(["-nodes", "-batch"])
        .build();
    let sign = Command::builder("openssl")
        .args(["ca", "-config"])
        .arg(&cnf)
        .arg("-days")
        .arg(&days)
        .arg("-in")
        .arg(&csr)
        .arg("-out")
        .arg(&crt)
        .arg("-batch")
        .build();

    Plan::new("domain-certificate", MessageKey::DomainCertGenFailed)
        .step(Step::CreateDir(dir.clone()))
        .step(Step::Render {
            from: config.ca.dir.join("openssl.cnf"),
            to: cnf.clone(),
            needle: config.ca.template_domain.clone(),
            replacement: domain.to_string(),
        })
        .step(Step::Run(request))
        .step(Step::Run(sign))
        .step(Step::Symlink {
            target: config.ca.trust_store_cert.clone(),
            link: dir.join("ca.pem"),
        })
        .step(Step::RemoveFile(csr))
        .step(Step::Chmod {
            path: dir,
            mode: 0o755,
        })
        .step(Step::Chmod {
            path: key,
            mode: 0o640,
        })
        .step(Step::Chmod {
            path: crt,
            mode: 0o640,
        })
        .step(Step::Chmod {
            path: cnf,
            mode: 0o600,
        })
}

/// Ordered steps switching the proxy, TLS material and services to `new`
pub fn switch_plan(config: &ToolsConfig, old: &str, new: &str) -> Plan {
    let template_name = config
        .paths
        .nginx_local_template
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "yunohost_local.conf".into());
    let cert_dir = config.cert_dir(new);

    Plan::new("main-domain", MessageKey::MaindomainChangeFailed)
        .step(Step::RemoveFile(
            config.nginx_domain_dir(old).join(&template_name),
        ))
        .step(Step::CopyFile {
            from: config.paths.nginx_local_template.clone(),
            to: config.nginx_domain_dir(new).join(&template_name),
        })
        .step(Step::Symlink {
            target: cert_dir.join("key.pem"),
            link: config.paths.ssl_key_link.clone(),
        })
        .step(Step::Symlink {
            target: cert_dir.join("crt.pem"),
            link: config.paths.ssl_cert_link.clone(),
        })
        .step(Step::WriteFile {
            path: config.paths.current_host.clone(),
            contents: format!("{}\n", new),
        })
        .steps(
            config
                .services
                .restart_order
                .iter()
                .map(|service| Step::Restart(service.clone())),
        )
}

/// Query or change the main domain
pub async fn main_domain(
    ctx: &AdminContext,
    journal: &mut Journal,
    request: MainDomainRequest,
) -> Result<MainDomain> {
    let config = &ctx.config;

    let old = match request.old.filter(|old| !old.is_empty()) {
        Some(old) => old,
        None => {
            let current = read_current_domain(config)?;
            if request.new.is_none() {
                return Ok(MainDomain::Current {
                    current_main_domain: current,
                });
            }
            current
        }
    };

    let new = match request.new.filter(|new| !new.trim().is_empty()) {
        Some(new) => new,
        None => {
            return Err(Error::invalid_argument(
                MessageKey::NewDomainRequired,
                "a new main domain is required",
            ));
        }
    };
    check_domain(&new)?;

    if !ctx.domains.list().await?.iter().any(|d| d == &new) {
        ctx.domains.register(&new).await?;
    }

    if config.cert_dir(&new).join("crt.pem").exists() {
        debug!(domain = %new, "certificate present");
    } else {
        StepRunner::new(ctx)
            .execute(&certificate_plan(config, &new))
            .await?;
        info!(domain = %new, "certificate issued");
    }

    for path in &config.domain.files {
        if rewrite_file(path, &old, &new)? {
            debug!(file = %path.display(), "domain rewritten");
        } else {
            warn!(file = %path.display(), "domain file missing, skipped");
        }
    }

    zone::move_subdomains(config, journal, &old, &new)?;

    StepRunner::new(ctx)
        .execute(&switch_plan(config, &old, &new))
        .await?;

    if request.dyndns {
        subscribe_if_eligible(ctx, &new).await?;
    }

    info!(%old, %new, "main domain changed");
    journal.success(MessageKey::MaindomainChanged);
    Ok(MainDomain::Changed { old, new })
}

async fn subscribe_if_eligible(ctx: &AdminContext, domain: &str) -> Result<()> {
    let Some(zone) = parent_zone(domain) else {
        return Ok(());
    };
    let zones = match ctx.dyndns.eligible_zones().await {
        Ok(zones) => zones,
        Err(Error::Network(reason)) => {
            debug!(%reason, "dynamic DNS registry unreachable");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if zones.iter().any(|z| z == zone) {
        ctx.dyndns.subscribe(domain).await?;
    }
    Ok(())
}
