//! English message catalogue

use hostadmin_core::{Event, Level, MessageKey};
use std::collections::BTreeMap;

/// Message template of `key`; `{name}` placeholders take event parameters
pub fn template(key: MessageKey) -> &'static str {
    match key {
        MessageKey::LdapInitialized => "LDAP has been initialized",
        MessageKey::LdapInitFailed => "Unable to initialize LDAP",
        MessageKey::AdminPasswordChanged => "The administration password has been changed",
        MessageKey::AdminPasswordChangeFailed => "Unable to change password",
        MessageKey::NewDomainRequired => "You must provide the new main domain",
        MessageKey::MaindomainChanged => "The main domain has been changed",
        MessageKey::MaindomainChangeFailed => "Unable to change the main domain",
        MessageKey::DomainZoneNotFound => "DNS zone file not found for {domain}",
        MessageKey::DomainNameInvalid => "Invalid domain name",
        MessageKey::DomainCertGenFailed => "Unable to generate certificate",
        MessageKey::DyndnsUnavailable => "Unavailable DynDNS subdomain",
        MessageKey::YunohostAlreadyInstalled => "YunoHost is already installed",
        MessageKey::YunohostInstalling => "Installing YunoHost...",
        MessageKey::FilesystemLayoutFailed => "Unable to create the system directories",
        MessageKey::YunohostCaCreationFailed => "Unable to create certificate authority",
        MessageKey::YunohostConfigured => "YunoHost has been configured",
        MessageKey::UpdatingAptCache => "Updating the list of available packages...",
        MessageKey::UpdateCacheFailed => "Unable to update APT cache",
        MessageKey::Done => "Done.",
        MessageKey::PackagesNoUpgrade => "There is no package to upgrade",
        MessageKey::PackagesUpgradeCriticalLater => "Critical packages ({packages}) will be upgraded later",
        MessageKey::UpgradingPackages => "Upgrading packages...",
        MessageKey::PackagesUpgradeFailed => "Unable to upgrade all of the packages",
        MessageKey::AppUpgradeFailed => "Unable to upgrade all apps",
        MessageKey::SystemUpgraded => "The system has been upgraded",
        MessageKey::MigrationStepFailed => "Migration step {index} failed: {step}",
        MessageKey::SystemRebooting => "The system is rebooting",
    }
}

/// Fill the template of `key` with `params`
///
/// Unknown placeholders are left as they are.
pub fn render(key: MessageKey, params: &BTreeMap<String, String>) -> String {
    let mut text = template(key).to_string();
    for (name, value) in params {
        text = text.replace(&format!("{{{}}}", name), value);
    }
    text
}

/// One line for an event, prefixed by its severity
pub fn event_line(event: &Event) -> String {
    let text = render(event.key, &event.params);
    match event.level {
        Level::Info => text,
        Level::Success => format!("Success! {}", text),
        Level::Warning => format!("Warning: {}", text),
        Level::Error => format!("Error: {}", text),
    }
}
