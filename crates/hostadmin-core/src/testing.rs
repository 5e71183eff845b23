//! In-memory collaborators and a temp-dir test bed
//!
//! [`TestBed`] rebases the whole configuration into a temporary directory,
//! seeds it with the files a freshly installed system has, and wires every
//! collaborator to a recording double. Plain system commands go to a
//! [`ScriptedRunner`], which leaves behind the files `openssl` would write.

use async_trait::async_trait;
use command_executor::testing::ScriptedRunner;
use hostadmin_config::{Attributes, ToolsConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::context::{AdminContext, Interface};
use crate::error::{Error, Result};
use crate::journal::MessageKey;
use crate::system::{
    AppManager, CatalogApp, ChangeSet, Directory, DirectoryDomainRegistry, DirectoryEntry,
    DyndnsRegistry, Firewall, InstalledApp, PackageChange, PackageManager, ServiceManager,
    SsoGateway,
};

/// Directory kept in memory
pub struct MemoryDirectory {
    admin_rdn: String,
    entries: Mutex<BTreeMap<String, Attributes>>,
    credentials: Mutex<BTreeMap<String, String>>,
    authenticated: Mutex<bool>,
    failing_adds: Mutex<BTreeSet<String>>,
    racing_adds: Mutex<BTreeSet<String>>,
    credential_changes_fail: Mutex<bool>,
    added: Mutex<Vec<String>>,
}

impl MemoryDirectory {
    /// An empty directory whose admin accepts `password`
    pub fn new(admin_rdn: &str, password: &str) -> Self {
        let mut credentials = BTreeMap::new();
        credentials.insert(admin_rdn.to_string(), password.to_string());
        Self {
            admin_rdn: admin_rdn.to_string(),
            entries: Mutex::new(BTreeMap::new()),
            credentials: Mutex::new(credentials),
            authenticated: Mutex::new(false),
            failing_adds: Mutex::new(BTreeSet::new()),
            racing_adds: Mutex::new(BTreeSet::new()),
            credential_changes_fail: Mutex::new(false),
            added: Mutex::new(Vec::new()),
        }
    }

    /// Insert an entry directly
    pub fn seed(&self, rdn: &str, attributes: Attributes) {
        self.entries.lock().unwrap().insert(rdn.to_string(), attributes);
    }

    /// Attributes of an entry
    pub fn entry(&self, rdn: &str) -> Option<Attributes> {
        self.entries.lock().unwrap().get(rdn).cloned()
    }

    /// Every entry, in creation order
    pub fn rdns(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    /// Entries created through `add`, in order
    pub fn added(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    /// Make `add` of `rdn` fail with a directory error
    pub fn fail_add_of(&self, rdn: &str) {
        self.failing_adds.lock().unwrap().insert(rdn.to_string());
    }

    /// Make `rdn` appear between the existence check and `add`
    pub fn race_on(&self, rdn: &str) {
        self.racing_adds.lock().unwrap().insert(rdn.to_string());
    }

    /// Make every credential change fail
    pub fn fail_credential_changes(&self) {
        *self.credential_changes_fail.lock().unwrap() = true;
    }

    /// Current credential of `rdn`
    pub fn credential(&self, rdn: &str) -> Option<String> {
        self.credentials.lock().unwrap().get(rdn).cloned()
    }

    fn require_auth(&self) -> Result<()> {
        if *self.authenticated.lock().unwrap() {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn authenticate(&self, password: &str) -> Result<()> {
        if self.credential(&self.admin_rdn).as_deref() == Some(password) {
            *self.authenticated.lock().unwrap() = true;
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                key: MessageKey::LdapInitFailed,
                reason: "invalid credentials".into(),
            })
        }
    }

    async fn exists(&self, rdn: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().contains_key(rdn))
    }

    async fn add(&self, entry: &DirectoryEntry) -> Result<()> {
        self.require_auth()?;
        if self.failing_adds.lock().unwrap().contains(&entry.rdn) {
            return Err(Error::directory(&entry.rdn, "server unwilling to perform"));
        }
        let mut entries = self.entries.lock().unwrap();
        if self.racing_adds.lock().unwrap().remove(&entry.rdn) {
            entries.insert(entry.rdn.clone(), entry.attributes.clone());
            return Err(Error::EntryExists(entry.rdn.clone()));
        }
        if entries.contains_key(&entry.rdn) {
            return Err(Error::EntryExists(entry.rdn.clone()));
        }
        entries.insert(entry.rdn.clone(), entry.attributes.clone());
        self.added.lock().unwrap().push(entry.rdn.clone());
        Ok(())
    }

    async fn update(&self, entry: &DirectoryEntry) -> Result<()> {
        self.require_auth()?;
        let mut entries = self.entries.lock().unwrap();
        let current = entries.entry(entry.rdn.clone()).or_default();
        for (name, values) in &entry.attributes {
            current.insert(name.clone(), values.clone());
        }
        Ok(())
    }

    async fn change_credential(&self, rdn: &str, password: &str) -> Result<()> {
        self.require_auth()?;
        if *self.credential_changes_fail.lock().unwrap() {
            return Err(Error::directory(rdn, "insufficient access"));
        }
        self.credentials
            .lock()
            .unwrap()
            .insert(rdn.to_string(), password.to_string());
        Ok(())
    }

    async fn search_attribute(
        &self,
        base_rdn: &str,
        _filter: &str,
        attribute: &str,
    ) -> Result<Vec<String>> {
        let suffix = format!(",{}", base_rdn);
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(rdn, _)| rdn.ends_with(&suffix))
            .filter_map(|(_, attrs)| attrs.get(attribute))
            .flatten()
            .cloned()
            .collect())
    }
}

/// Application manager over fixed settings and catalog
#[derive(Default)]
pub struct StaticAppManager {
    installed: Mutex<BTreeMap<String, InstalledApp>>,
    catalog: Mutex<BTreeMap<String, CatalogApp>>,
    refresh_fails: Mutex<bool>,
    upgrade_fails: Mutex<bool>,
    refreshes: Mutex<usize>,
    upgrades: Mutex<usize>,
}

impl StaticAppManager {
    /// Add an installed instance
    pub fn install(&self, app: InstalledApp) {
        self.installed.lock().unwrap().insert(app.id.clone(), app);
    }

    /// Publish catalog metadata for a base id
    pub fn publish(&self, id: &str, app: CatalogApp) {
        self.catalog.lock().unwrap().insert(id.to_string(), app);
    }

    /// Make catalog refreshes fail
    pub fn fail_refresh(&self) {
        *self.refresh_fails.lock().unwrap() = true;
    }

    /// Make upgrades fail
    pub fn fail_upgrade(&self) {
        *self.upgrade_fails.lock().unwrap() = true;
    }

    /// Number of catalog refreshes attempted
    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock().unwrap()
    }

    /// Number of upgrades attempted
    pub fn upgrades(&self) -> usize {
        *self.upgrades.lock().unwrap()
    }
}

#[async_trait]
impl AppManager for StaticAppManager {
    async fn refresh_catalog(&self) -> Result<()> {
        *self.refreshes.lock().unwrap() += 1;
        if *self.refresh_fails.lock().unwrap() {
            return Err(Error::App("catalog download failed".into()));
        }
        Ok(())
    }

    async fn installed_ids(&self) -> Result<Vec<String>> {
        Ok(self.installed.lock().unwrap().keys().cloned().collect())
    }

    async fn installed_app(&self, id: &str) -> Result<InstalledApp> {
        self.installed
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::App(format!("{} is not installed", id)))
    }

    async fn catalog_app(&self, id: &str) -> Result<Option<CatalogApp>> {
        Ok(self.catalog.lock().unwrap().get(id).cloned())
    }

    async fn upgrade_all(&self) -> Result<()> {
        *self.upgrades.lock().unwrap() += 1;
        if *self.upgrade_fails.lock().unwrap() {
            return Err(Error::App("upgrade script failed".into()));
        }
        Ok(())
    }
}

/// Dynamic DNS registry with fixed answers
#[derive(Default)]
pub struct StaticDyndns {
    zones: Mutex<Vec<String>>,
    unreachable: Mutex<bool>,
    taken: Mutex<BTreeSet<String>>,
    subscribed: Mutex<Vec<String>>,
    queries: Mutex<usize>,
}

impl StaticDyndns {
    /// Offer registrations under `zones`
    pub fn offer(&self, zones: &[&str]) {
        *self.zones.lock().unwrap() = zones.iter().map(|z| z.to_string()).collect();
    }

    /// Make every request fail with a network error
    pub fn go_offline(&self) {
        *self.unreachable.lock().unwrap() = true;
    }

    /// Mark `domain` as registered by someone else
    pub fn take(&self, domain: &str) {
        self.taken.lock().unwrap().insert(domain.to_string());
    }

    /// Domains subscribed so far
    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }

    /// Number of registry requests made
    pub fn queries(&self) -> usize {
        *self.queries.lock().unwrap()
    }

    fn request(&self) -> Result<()> {
        *self.queries.lock().unwrap() += 1;
        if *self.unreachable.lock().unwrap() {
            return Err(Error::Network("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DyndnsRegistry for StaticDyndns {
    async fn eligible_zones(&self) -> Result<Vec<String>> {
        self.request()?;
        Ok(self.zones.lock().unwrap().clone())
    }

    async fn is_available(&self, domain: &str) -> Result<bool> {
        self.request()?;
        Ok(!self.taken.lock().unwrap().contains(domain))
    }

    async fn subscribe(&self, domain: &str) -> Result<()> {
        self.subscribed.lock().unwrap().push(domain.to_string());
        Ok(())
    }
}

/// Package manager with a fixed simulation
#[derive(Default)]
pub struct FakePackageManager {
    changes: Mutex<Vec<PackageChange>>,
    refresh_fails: Mutex<bool>,
    commit_fails: Mutex<bool>,
    changelog_fails: Mutex<bool>,
    refreshes: Mutex<usize>,
    committed: Mutex<Vec<ChangeSet>>,
}

impl FakePackageManager {
    /// The simulation upgrades `names` from version 1 to 2
    pub fn offer(&self, names: &[&str]) {
        *self.changes.lock().unwrap() = names
            .iter()
            .map(|name| PackageChange {
                name: name.to_string(),
                fullname: format!("{}:amd64", name),
                current: Some("1".into()),
                candidate: "2".into(),
            })
            .collect();
    }

    /// Make index refreshes fail
    pub fn fail_refresh(&self) {
        *self.refresh_fails.lock().unwrap() = true;
    }

    /// Make commits fail
    pub fn fail_commit(&self) {
        *self.commit_fails.lock().unwrap() = true;
    }

    /// Make changelog retrieval fail
    pub fn fail_changelog(&self) {
        *self.changelog_fails.lock().unwrap() = true;
    }

    /// Number of index refreshes attempted
    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock().unwrap()
    }

    /// Change sets passed to `commit`
    pub fn committed(&self) -> Vec<ChangeSet> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageManager for FakePackageManager {
    async fn refresh_index(&self) -> Result<()> {
        *self.refreshes.lock().unwrap() += 1;
        if *self.refresh_fails.lock().unwrap() {
            return Err(Error::Package("could not resolve mirror".into()));
        }
        Ok(())
    }

    async fn simulate_upgrade(&self) -> Result<ChangeSet> {
        Ok(ChangeSet::new(self.changes.lock().unwrap().clone()))
    }

    async fn changelog(&self, change: &PackageChange) -> Result<String> {
        if *self.changelog_fails.lock().unwrap() {
            return Err(Error::Package("changelog server unreachable".into()));
        }
        Ok(format!("{} ({}) stable; urgency=low\n", change.name, change.candidate))
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<()> {
        self.committed.lock().unwrap().push(changes.clone());
        if *self.commit_fails.lock().unwrap() {
            return Err(Error::Package("dpkg returned an error code".into()));
        }
        Ok(())
    }
}

/// Service manager recording what it is asked to do
#[derive(Default)]
pub struct RecordingServices {
    actions: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<String>>,
    logs: Mutex<BTreeMap<String, Vec<String>>>,
}

impl RecordingServices {
    /// Make restarting `service` fail
    pub fn fail_restart_of(&self, service: &str) {
        self.failing.lock().unwrap().insert(service.to_string());
    }

    /// Set the log of `service`
    pub fn set_log(&self, service: &str, lines: Vec<String>) {
        self.logs.lock().unwrap().insert(service.to_string(), lines);
    }

    /// Actions so far, as `restart <svc>` / `enable <svc>`
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    /// Services restarted, in order
    pub fn restarted(&self) -> Vec<String> {
        self.actions()
            .iter()
            .filter_map(|a| a.strip_prefix("restart ").map(String::from))
            .collect()
    }
}

#[async_trait]
impl ServiceManager for RecordingServices {
    async fn restart(&self, service: &str) -> Result<()> {
        self.actions.lock().unwrap().push(format!("restart {}", service));
        if self.failing.lock().unwrap().contains(service) {
            return Err(Error::CommandFailed {
                command: format!("service {} restart", service),
                code: Some(1),
                detail: String::new(),
            });
        }
        Ok(())
    }

    async fn enable_at_boot(&self, service: &str) -> Result<()> {
        self.actions.lock().unwrap().push(format!("enable {}", service));
        Ok(())
    }

    async fn log_tail(&self, service: &str, lines: usize) -> Result<Vec<String>> {
        let logs = self.logs.lock().unwrap();
        let all = logs.get(service).cloned().unwrap_or_default();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].to_vec())
    }
}

/// Firewall recording its calls
#[derive(Default)]
pub struct RecordingFirewall {
    calls: Mutex<Vec<String>>,
}

impl RecordingFirewall {
    /// Calls so far: `upnp`, `upnp --no-refresh`, `reload`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Firewall for RecordingFirewall {
    async fn enable_upnp(&self, defer_reload: bool) -> Result<()> {
        let call = if defer_reload { "upnp --no-refresh" } else { "upnp" };
        self.calls.lock().unwrap().push(call.to_string());
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.calls.lock().unwrap().push("reload".to_string());
        Ok(())
    }
}

/// SSO gateway counting regenerations
#[derive(Default)]
pub struct RecordingSso {
    regenerations: Mutex<usize>,
}

impl RecordingSso {
    /// Number of regenerations
    pub fn regenerations(&self) -> usize {
        *self.regenerations.lock().unwrap()
    }
}

#[async_trait]
impl SsoGateway for RecordingSso {
    async fn regenerate(&self) -> Result<()> {
        *self.regenerations.lock().unwrap() += 1;
        Ok(())
    }
}

/// Scheme seeded into every test bed
pub const TEST_SCHEME: &str = "\
parents:
  ou=users:
    ou: users
    objectClass: [organizationalUnit, top]
  ou=domains:
    ou: domains
    objectClass: [organizationalUnit, top]
  ou=groups:
    ou: groups
    objectClass: [organizationalUnit, top]
children:
  cn=admins,ou=groups:
    cn: admins
    gidNumber: 4001
    memberUid: admin
    objectClass: [posixGroup, top]
";

/// Zone of the stock domain, with the service subdomains
pub const STOCK_ZONE: &str = "\
$TTL 3600
@       IN  A       203.0.113.7
pubsub  IN  CNAME   yunohost.org.
muc     IN  CNAME   yunohost.org.
vjud    IN  CNAME   yunohost.org.
";

/// A freshly installed system inside a temp dir, with recording collaborators
pub struct TestBed {
    /// Root of the rebased file system
    pub root: TempDir,
    /// Configuration rebased under `root`
    pub config: Arc<ToolsConfig>,
    /// Runner for plain system commands
    pub runner: Arc<ScriptedRunner>,
    /// Directory
    pub directory: Arc<MemoryDirectory>,
    /// Applications
    pub apps: Arc<StaticAppManager>,
    /// Dynamic DNS registry
    pub dyndns: Arc<StaticDyndns>,
    /// Packages
    pub packages: Arc<FakePackageManager>,
    /// Services
    pub services: Arc<RecordingServices>,
    /// Firewall
    pub firewall: Arc<RecordingFirewall>,
    /// SSO gateway
    pub sso: Arc<RecordingSso>,
}

impl TestBed {
    /// Create and seed a test bed
    pub fn new() -> Self {
        let root = TempDir::new().expect("create temp dir");
        let mut config = ToolsConfig::default();
        config.rebase(root.path());

        let bed = Self {
            directory: Arc::new(MemoryDirectory::new(
                &config.ldap.admin_rdn,
                &config.ldap.bootstrap_password,
            )),
            config: Arc::new(config),
            root,
            runner: Arc::new(ScriptedRunner::new()),
            apps: Arc::new(StaticAppManager::default()),
            dyndns: Arc::new(StaticDyndns::default()),
            packages: Arc::new(FakePackageManager::default()),
            services: Arc::new(RecordingServices::default()),
            firewall: Arc::new(RecordingFirewall::default()),
            sso: Arc::new(RecordingSso::default()),
        };
        bed.runner.creates_outputs("openssl", &["-out", "-keyout"]);
        bed.seed();
        bed
    }

    fn seed(&self) {
        let config = &self.config;
        let stock = &config.domain.default_domain;

        self.write(&config.paths.current_host, &format!("{}\n", stock));
        for file in &config.domain.files {
            let name = file.file_name().unwrap().to_string_lossy();
            self.write(file, &format!("# {}\nhostname = {}\n", name, stock));
        }
        self.write(&config.zone_file(stock), STOCK_ZONE);
        self.write(
            &config.paths.nginx_local_template,
            "location /yunohost/admin { alias /usr/share/yunohost/admin/; }\n",
        );
        self.write(&config.paths.ldap_scheme, TEST_SCHEME);
        self.write(
            &config.ca.dir.join("openssl.cnf"),
            &format!("commonName_default = {}\n", config.ca.template_domain),
        );
        self.write(
            &config.ca.dir.join("ca").join("cacert.pem"),
            "-----BEGIN CERTIFICATE-----\n",
        );
        self.write(
            &config.migration.sources_list,
            &format!("deb http://ftp.debian.org/debian {} main\n", config.migration.from_release),
        );
        for dir in [
            &config.paths.cron_dir,
            &config.paths.certs,
            config.migration.project_sources.parent().unwrap(),
        ] {
            std::fs::create_dir_all(dir).unwrap();
        }
    }

    /// Context in CLI mode
    pub fn context(&self) -> AdminContext {
        AdminContext {
            config: self.config.clone(),
            interface: Interface::Cli,
            runner: self.runner.clone(),
            directory: self.directory.clone(),
            domains: Arc::new(DirectoryDomainRegistry::new(self.directory.clone())),
            apps: self.apps.clone(),
            dyndns: self.dyndns.clone(),
            packages: self.packages.clone(),
            services: self.services.clone(),
            firewall: self.firewall.clone(),
            sso: self.sso.clone(),
        }
    }

    /// Context in API mode
    pub fn api_context(&self) -> AdminContext {
        self.context().with_interface(Interface::Api)
    }

    /// Write a file, creating its directory
    pub fn write(&self, path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    /// Read a file
    pub fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e))
    }

    /// Every file and link under the root with its content or link target
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect(self.root.path(), &mut files);
        files
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}

fn collect(dir: &Path, files: &mut BTreeMap<PathBuf, Vec<u8>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(kind) = entry.file_type() else {
            continue;
        };
        if kind.is_symlink() {
            let target = std::fs::read_link(&path).unwrap_or_default();
            files.insert(path, target.to_string_lossy().into_owned().into_bytes());
        } else if kind.is_dir() {
            files.insert(path.clone(), Vec::new());
            collect(&path, files);
        } else {
            files.insert(path.clone(), std::fs::read(&path).unwrap_or_default());
        }
    }
}
