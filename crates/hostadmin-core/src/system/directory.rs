//! Directory service access

use async_trait::async_trait;
use command_executor::{Command, CommandRunner};
use hostadmin_config::{Attributes, LdapSettings};
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::debug;

use super::ldif;
use crate::error::{Error, Result};

/// `ldapsearch` exit code for a missing base entry
const NO_SUCH_OBJECT: i32 = 32;
/// `ldapadd` exit code for a conflicting entry
const ALREADY_EXISTS: i32 = 68;

/// One directory entry, identified relative to the base
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Relative distinguished name, e.g. `ou=users`
    pub rdn: String,
    /// Attribute values
    pub attributes: Attributes,
}

impl DirectoryEntry {
    /// Create an entry
    pub fn new(rdn: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            rdn: rdn.into(),
            attributes,
        }
    }

    /// The administrative account with its fixed attribute set
    pub fn admin(rdn: &str, password: &str) -> Self {
        let mut attributes = Attributes::new();
        let mut set = |name: &str, values: &[&str]| {
            attributes.insert(
                name.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        };
        set("cn", &["admin"]);
        set("uid", &["admin"]);
        set("description", &["LDAP Administrator"]);
        set("gidNumber", &["1007"]);
        set("uidNumber", &["1007"]);
        set("homeDirectory", &["/home/admin"]);
        set("loginShell", &["/bin/bash"]);
        set(
            "objectClass",
            &["organizationalRole", "posixAccount", "simpleSecurityObject"],
        );
        set("userPassword", &[password]);
        Self::new(rdn, attributes)
    }
}

/// Directory operations the orchestrators need
#[async_trait]
pub trait Directory: Send + Sync {
    /// Bind as the administrative account
    async fn authenticate(&self, password: &str) -> Result<()>;

    /// Whether the entry exists
    async fn exists(&self, rdn: &str) -> Result<bool>;

    /// Create an entry, failing with [`Error::EntryExists`] on conflict
    async fn add(&self, entry: &DirectoryEntry) -> Result<()>;

    /// Create the entry or replace the listed attributes of an existing one
    async fn update(&self, entry: &DirectoryEntry) -> Result<()>;

    /// Set the credential of an entry
    async fn change_credential(&self, rdn: &str, password: &str) -> Result<()>;

    /// Values of `attribute` on entries below `base_rdn` matching `filter`
    async fn search_attribute(
        &self,
        base_rdn: &str,
        filter: &str,
        attribute: &str,
    ) -> Result<Vec<String>>;
}

/// Directory driven through the OpenLDAP command line clients
pub struct LdapDirectory {
    runner: Arc<dyn CommandRunner>,
    settings: LdapSettings,
    password: Mutex<Option<String>>,
}

impl LdapDirectory {
    /// Create a directory client; nothing is contacted until first use
    pub fn new(runner: Arc<dyn CommandRunner>, settings: LdapSettings) -> Self {
        Self {
            runner,
            settings,
            password: Mutex::new(None),
        }
    }

    fn dn(&self, rdn: &str) -> String {
        format!("{},{}", rdn, self.settings.base_dn)
    }

    fn bind_dn(&self) -> String {
        self.dn(&self.settings.admin_rdn)
    }

    fn current_password(&self) -> Option<String> {
        self.password
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn remember_password(&self, password: &str) {
        if let Ok(mut guard) = self.password.lock() {
            *guard = Some(password.to_string());
        }
    }

    /// Base command with server and, when available, admin bind options
    ///
    /// The returned temp file holds the bind password and must outlive the
    /// command.
    fn client(&self, program: &str, password: Option<&str>) -> Result<(Command, Option<NamedTempFile>)> {
        let mut cmd = Command::new(program);
        cmd.args(["-x", "-H", self.settings.uri.as_str()]);
        match password {
            Some(password) => {
                let file = secret_file(password)?;
                cmd.arg("-D").arg(self.bind_dn()).arg("-y").arg(file.path());
                Ok((cmd, Some(file)))
            }
            None => Ok((cmd, None)),
        }
    }

    fn bound_client(&self, program: &str) -> Result<(Command, NamedTempFile)> {
        let password = self.current_password().ok_or(Error::NotAuthenticated)?;
        let (cmd, file) = self.client(program, Some(&password))?;
        let file = file.ok_or(Error::NotAuthenticated)?;
        Ok((cmd, file))
    }

    async fn apply_ldif(&self, program: &str, rdn: &str, record: &str) -> Result<()> {
        let (mut cmd, _secret) = self.bound_client(program)?;
        let input = secret_file(record)?;
        cmd.arg("-f").arg(input.path());

        let output = self.runner.output(&cmd).await?;
        match output.status.code {
            Some(0) => Ok(()),
            Some(ALREADY_EXISTS) => Err(Error::EntryExists(rdn.to_string())),
            _ => Err(Error::directory(rdn, Error::command_failed(&cmd, &output).to_string())),
        }
    }
}

fn secret_file(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn authenticate(&self, password: &str) -> Result<()> {
        let (cmd, _secret) = self.client("ldapwhoami", Some(password))?;
        let output = self.runner.output(&cmd).await?;
        if !output.status.success() {
            return Err(Error::PermissionDenied {
                key: crate::journal::MessageKey::LdapInitFailed,
                reason: Error::command_failed(&cmd, &output).to_string(),
            });
        }
        debug!(bind_dn = %self.bind_dn(), "authenticated to directory");
        self.remember_password(password);
        Ok(())
    }

    async fn exists(&self, rdn: &str) -> Result<bool> {
        let password = self.current_password();
        let (mut cmd, _secret) = self.client("ldapsearch", password.as_deref())?;
        cmd.args(["-LLL", "-s", "base", "-b"]).arg(self.dn(rdn)).arg("dn");

        let output = self.runner.output(&cmd).await?;
        match output.status.code {
            Some(0) => Ok(true),
            Some(NO_SUCH_OBJECT) => Ok(false),
            _ => Err(Error::directory(rdn, Error::command_failed(&cmd, &output).to_string())),
        }
    }

    async fn add(&self, entry: &DirectoryEntry) -> Result<()> {
        let record = ldif::add_record(&self.dn(&entry.rdn), &entry.attributes);
        self.apply_ldif("ldapadd", &entry.rdn, &record).await?;
        debug!(rdn = %entry.rdn, "directory entry added");
        Ok(())
    }

    async fn update(&self, entry: &DirectoryEntry) -> Result<()> {
        if !self.exists(&entry.rdn).await? {
            return self.add(entry).await;
        }
        let record = ldif::replace_record(&self.dn(&entry.rdn), &entry.attributes);
        self.apply_ldif("ldapmodify", &entry.rdn, &record).await?;
        debug!(rdn = %entry.rdn, "directory entry updated");
        Ok(())
    }

    async fn change_credential(&self, rdn: &str, password: &str) -> Result<()> {
        let (mut cmd, _secret) = self.bound_client("ldappasswd")?;
        let new_secret = secret_file(password)?;
        cmd.arg("-T").arg(new_secret.path()).arg(self.dn(rdn));

        let output = self.runner.output(&cmd).await?;
        if !output.status.success() {
            return Err(Error::directory(rdn, Error::command_failed(&cmd, &output).to_string()));
        }
        if rdn == self.settings.admin_rdn {
            self.remember_password(password);
        }
        Ok(())
    }

    async fn search_attribute(
        &self,
        base_rdn: &str,
        filter: &str,
        attribute: &str,
    ) -> Result<Vec<String>> {
        let password = self.current_password();
        let (mut cmd, _secret) = self.client("ldapsearch", password.as_deref())?;
        cmd.args(["-LLL", "-o", "ldif-wrap=no", "-b"])
            .arg(self.dn(base_rdn))
            .arg(filter)
            .arg(attribute);

        let output = self.runner.output(&cmd).await?;
        match output.status.code {
            Some(0) => Ok(ldif::attribute_values(&output.stdout, attribute)),
            Some(NO_SUCH_OBJECT) => Ok(Vec::new()),
            _ => Err(Error::directory(base_rdn, Error::command_failed(&cmd, &output).to_string())),
        }
    }
}
