//! Structured administrator notifications
//!
//! Orchestrators never print. They push [`Event`]s into a [`Journal`], each
//! carrying a stable [`MessageKey`] and named parameters. The binary decides
//! how to present them (localised text, JSON for API callers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{error, info, warn};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Progress information
    Info,
    /// Operation completed
    Success,
    /// Something was skipped or degraded
    Warning,
    /// A step failed
    Error,
}

/// Localisation key of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum MessageKey {
    LdapInitialized,
    LdapInitFailed,
    AdminPasswordChanged,
    AdminPasswordChangeFailed,
    NewDomainRequired,
    MaindomainChanged,
    MaindomainChangeFailed,
    DomainZoneNotFound,
    DomainNameInvalid,
    DomainCertGenFailed,
    DyndnsUnavailable,
    YunohostAlreadyInstalled,
    YunohostInstalling,
    FilesystemLayoutFailed,
    YunohostCaCreationFailed,
    YunohostConfigured,
    UpdatingAptCache,
    UpdateCacheFailed,
    Done,
    PackagesNoUpgrade,
    PackagesUpgradeCriticalLater,
    UpgradingPackages,
    PackagesUpgradeFailed,
    AppUpgradeFailed,
    SystemUpgraded,
    MigrationStepFailed,
    SystemRebooting,
}

impl MessageKey {
    /// The key as written in message catalogues
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LdapInitialized => "ldap_initialized",
            Self::LdapInitFailed => "ldap_init_failed",
            Self::AdminPasswordChanged => "admin_password_changed",
            Self::AdminPasswordChangeFailed => "admin_password_change_failed",
            Self::NewDomainRequired => "new_domain_required",
            Self::MaindomainChanged => "maindomain_changed",
            Self::MaindomainChangeFailed => "maindomain_change_failed",
            Self::DomainZoneNotFound => "domain_zone_not_found",
            Self::DomainNameInvalid => "domain_name_invalid",
            Self::DomainCertGenFailed => "domain_cert_gen_failed",
            Self::DyndnsUnavailable => "dyndns_unavailable",
            Self::YunohostAlreadyInstalled => "yunohost_already_installed",
            Self::YunohostInstalling => "yunohost_installing",
            Self::FilesystemLayoutFailed => "filesystem_layout_failed",
            Self::YunohostCaCreationFailed => "yunohost_ca_creation_failed",
            Self::YunohostConfigured => "yunohost_configured",
            Self::UpdatingAptCache => "updating_apt_cache",
            Self::UpdateCacheFailed => "update_cache_failed",
            Self::Done => "done",
            Self::PackagesNoUpgrade => "packages_no_upgrade",
            Self::PackagesUpgradeCriticalLater => "packages_upgrade_critical_later",
            Self::UpgradingPackages => "upgrading_packages",
            Self::PackagesUpgradeFailed => "packages_upgrade_failed",
            Self::AppUpgradeFailed => "app_upgrade_failed",
            Self::SystemUpgraded => "system_upgraded",
            Self::MigrationStepFailed => "migration_step_failed",
            Self::SystemRebooting => "system_rebooting",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// When the notification was raised
    pub at: DateTime<Utc>,
    /// Severity
    pub level: Level,
    /// Localisation key
    pub key: MessageKey,
    /// Named message parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// Ordered list of notifications raised during one operation
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct Journal {
    events: Vec<Event>,
}

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notification with parameters
    pub fn emit<I, K, V>(&mut self, level: Level, key: MessageKey, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        match level {
            Level::Info | Level::Success => info!(key = %key, ?params, "notification"),
            Level::Warning => warn!(key = %key, ?params, "notification"),
            Level::Error => error!(key = %key, ?params, "notification"),
        }
        self.events.push(Event {
            at: Utc::now(),
            level,
            key,
            params,
        });
    }

    /// Record an info notification without parameters
    pub fn info(&mut self, key: MessageKey) {
        self.emit(Level::Info, key, no_params());
    }

    /// Record a success notification without parameters
    pub fn success(&mut self, key: MessageKey) {
        self.emit(Level::Success, key, no_params());
    }

    /// Record a warning with parameters
    pub fn warning_with<I, K, V>(&mut self, key: MessageKey, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.emit(Level::Warning, key, params);
    }

    /// Record an error notification without parameters
    pub fn error(&mut self, key: MessageKey) {
        self.emit(Level::Error, key, no_params());
    }

    /// All events, oldest first
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Whether a notification with `key` was raised
    pub fn contains(&self, key: MessageKey) -> bool {
        self.events.iter().any(|event| event.key == key)
    }

    /// Level of the first notification with `key`
    pub fn level_of(&self, key: MessageKey) -> Option<Level> {
        self.events
            .iter()
            .find(|event| event.key == key)
            .map(|event| event.level)
    }

    /// Keys in emission order
    pub fn keys(&self) -> Vec<MessageKey> {
        self.events.iter().map(|event| event.key).collect()
    }
}

fn no_params() -> [(String, String); 0] {
    []
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_snake_case() {
        let json = serde_json::to_string(&MessageKey::PackagesUpgradeCriticalLater).unwrap();
        assert_eq!(json, "\"packages_upgrade_critical_later\"");
        assert_eq!(
            MessageKey::YunohostCaCreationFailed.as_str(),
            "yunohost_ca_creation_failed"
        );
    }

    #[test]
    fn test_journal_records_in_order() {
        let mut journal = Journal::new();
        journal.info(MessageKey::UpdatingAptCache);
        journal.warning_with(MessageKey::DomainZoneNotFound, [("domain", "new.example")]);
        journal.success(MessageKey::SystemUpgraded);

        assert_eq!(
            journal.keys(),
            vec![
                MessageKey::UpdatingAptCache,
                MessageKey::DomainZoneNotFound,
                MessageKey::SystemUpgraded
            ]
        );
        assert_eq!(
            journal.level_of(MessageKey::DomainZoneNotFound),
            Some(Level::Warning)
        );
        assert_eq!(journal.events()[1].params["domain"], "new.example");
        assert!(!journal.contains(MessageKey::Done));
    }

    #[test]
    fn test_event_json_shape() {
        let mut journal = Journal::new();
        journal.error(MessageKey::AppUpgradeFailed);
        let value = serde_json::to_value(&journal).unwrap();
        assert_eq!(value[0]["level"], "error");
        assert_eq!(value[0]["key"], "app_upgrade_failed");
        assert!(value[0].get("params").is_none());
    }
}
