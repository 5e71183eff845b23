//! First-time provisioning of a freshly installed server
//!
//! Provisioning runs once. It checks the installed marker before touching
//! anything and writes it as the very last action, so a provisioning that
//! failed half-way can be run again.

use command_executor::Command;
use hostadmin_config::ToolsConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::bootstrap::{BootstrapReport, bootstrap_directory, change_admin_password};
use crate::context::AdminContext;
use crate::domain::{MainDomainRequest, check_domain, main_domain};
use crate::error::{Error, Result};
use crate::fsutil::{set_mode, write_atomic};
use crate::journal::{Journal, MessageKey};
use crate::steps::{Plan, Step, StepRunner};
use crate::system::parent_zone;

/// Arguments of [`postinstall`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostinstallRequest {
    /// Main domain of the server
    pub domain: String,
    /// New admin password
    pub password: String,
    /// Skip every dynamic DNS interaction
    pub ignore_dyndns: bool,
}

/// What provisioning did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostinstallReport {
    /// Main domain configured
    pub domain: String,
    /// Directory entries created and skipped
    pub directory: BootstrapReport,
}

/// Whether the system was provisioned already
pub fn is_installed(config: &ToolsConfig) -> bool {
    config.paths.installed_marker.exists()
}

/// Directories every provisioned system has
pub fn layout_plan(config: &ToolsConfig) -> Plan {
    Plan::new("filesystem-layout", MessageKey::FilesystemLayoutFailed)
        .steps(config.paths.required_dirs.iter().cloned().map(Step::CreateDir))
        .step(Step::Chmod {
            path: config.paths.app_data.clone(),
            mode: 0o755,
        })
}

/// Self-signed certificate authority for `domain`, trusted by the system
pub fn ca_plan(config: &ToolsConfig, domain: &str) -> Plan {
    let dir = &config.ca.dir;
    let ca_cnf = dir.join("openssl.ca.cnf");
    let cacert = dir.join("ca").join("cacert.pem");

    let openssl = Command::builder("openssl")
        .args(["req", "-x509", "-new", "-config"])
        .arg(&ca_cnf)
        .arg("-days")
        .arg(config.ca.validity_days.to_string())
        .arg("-out")
        .arg(&cacert)
        .arg("-keyout")
        .arg(dir.join("ca").join("cakey.pem"))
        .args(["-nodes", "-batch"])
        .build();

    Plan::new("certificate-authority", MessageKey::YunohostCaCreationFailed)
        .step(Step::WriteFile {
            path: dir.join("serial"),
            contents: "01\n".to_string(),
        })
        .step(Step::WriteFile {
            path: dir.join("index.txt"),
            contents: String::new(),
        })
        .step(Step::Render {
            from: dir.join("openssl.cnf"),
            to: ca_cnf,
            needle: config.ca.template_domain.clone(),
            replacement: domain.to_string(),
        })
        .step(Step::CreateDir(dir.join("ca")))
        .step(Step::Run(openssl))
        .step(Step::CopyFile {
            from: cacert,
            to: config.ca.trust_store_cert.clone(),
        })
        .step(Step::Run(Command::new("update-ca-certificates")))
}

/// Make the SSO gateway send `/` to the admin interface of `domain`
///
/// Other keys of the persistent configuration are kept. The file is written
/// with sorted keys, 4-space indentation and mode 0644.
pub fn merge_sso_redirect(path: &Path, domain: &str, admin_path: &str) -> Result<()> {
    let mut conf = match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content)?,
        Ok(_) => Value::Object(Map::new()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
        Err(e) => return Err(Error::file(path)(e)),
    };

    let Some(root) = conf.as_object_mut() else {
        return Err(Error::File {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "not a JSON object"),
        });
    };
    let redirects = root
        .entry("redirected_urls")
        .or_insert_with(|| Value::Object(Map::new()));
    if !redirects.is_object() {
        *redirects = Value::Object(Map::new());
    }
    if let Some(redirects) = redirects.as_object_mut() {
        redirects.insert("/".to_string(), Value::String(format!("{}{}", domain, admin_path)));
    }

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(&sort_keys(conf), &mut serializer)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::file(parent))?;
    }
    write_atomic(path, &out)?;
    set_mode(path, 0o644)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Refuse a domain the dynamic DNS registry can no longer give us
async fn check_dyndns(ctx: &AdminContext, domain: &str) -> Result<()> {
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
    if !zones.iter().any(|z| z == zone) {
        return Ok(());
    }
    match ctx.dyndns.is_available(domain).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::DyndnsUnavailable(domain.to_string())),
        Err(Error::Network(reason)) => {
            debug!(%reason, "dynamic DNS availability unknown");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Give the host a domain part when it has none
async fn ensure_hostname(ctx: &AdminContext) {
    let probe = Command::builder("hostname").arg("-d").build();
    let has_domain = matches!(ctx.runner.status(&probe).await, Ok(status) if status.success());
    if has_domain {
        return;
    }
    let fallback = &ctx.config.domain.fallback_hostname;
    let set = Command::builder("hostname").arg(fallback).build();
    match ctx.runner.status(&set).await {
        Ok(status) if status.success() => info!(hostname = %fallback, "fallback hostname set"),
        Ok(status) => warn!(code = ?status.code, "failed to set fallback hostname"),
        Err(e) => warn!(error = %e, "failed to set fallback hostname"),
    }
}

/// Provision the server for `request.domain`
pub async fn postinstall(
    ctx: &AdminContext,
    journal: &mut Journal,
    request: PostinstallRequest,
) -> Result<PostinstallReport> {
    let config = &ctx.config;

    if is_installed(config) {
        return Err(Error::AlreadyInstalled);
    }
    journal.info(MessageKey::YunohostInstalling);

    if request.domain.trim().is_empty() {
        return Err(Error::invalid_argument(
            MessageKey::NewDomainRequired,
            "a main domain is required",
        ));
    }
    if request.password.is_empty() {
        return Err(Error::invalid_argument(
            MessageKey::AdminPasswordChangeFailed,
            "an admin password is required",
        ));
    }
    let domain = request.domain.trim().to_string();
    check_domain(&domain)?;

    if !request.ignore_dyndns {
        check_dyndns(ctx, &domain).await?;
    }

    let steps = StepRunner::new(ctx);
    steps.execute(&layout_plan(config)).await?;
    ensure_hostname(ctx).await;
    merge_sso_redirect(&config.paths.ssowat_persistent, &domain, &config.domain.admin_path)?;
    steps.execute(&ca_plan(config, &domain)).await?;

    ctx.directory
        .authenticate(&config.ldap.bootstrap_password)
        .await?;
    let directory = bootstrap_directory(ctx, journal).await?;

    main_domain(
        ctx,
        journal,
        MainDomainRequest {
            old: Some(config.domain.default_domain.clone()),
            new: Some(domain.clone()),
            dyndns: !request.ignore_dyndns,
        },
    )
    .await?;

    ctx.sso.regenerate().await?;
    change_admin_password(ctx, journal, &request.password).await?;

    ctx.firewall.enable_upnp(true).await?;
    ctx.firewall.reload().await?;

    if let Err(e) = ctx.services.enable_at_boot(&config.services.firewall).await {
        warn!(service = %config.services.firewall, error = %e, "failed to enable firewall at boot");
    }

    write_atomic(&config.paths.installed_marker, b"")?;
    info!(%domain, "provisioning complete");
    journal.success(MessageKey::YunohostConfigured);

    Ok(PostinstallReport { domain, directory })
}
