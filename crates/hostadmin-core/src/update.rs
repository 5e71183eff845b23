//! Pending package and application updates

use serde::Serialize;
use tracing::{debug, warn};

use crate::context::AdminContext;
use crate::error::{Error, Result};
use crate::journal::{Journal, MessageKey};
use crate::system::{CatalogApp, InstalledApp};

/// Which halves of an update or upgrade to skip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeOptions {
    /// Leave applications alone
    pub ignore_apps: bool,
    /// Leave system packages alone
    pub ignore_packages: bool,
}

/// A package the next upgrade would change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageUpdate {
    /// Package name
    pub name: String,
    /// Architecture-qualified name
    pub fullname: String,
    /// Changelog of the candidate version, empty when unavailable
    pub changelog: String,
}

/// An application instance with a newer catalog revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppUpdate {
    /// Instance id
    pub id: String,
    /// Display label
    pub label: String,
}

/// Result of [`check_updates`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingUpdates {
    /// Pending package changes
    pub packages: Vec<PackageUpdate>,
    /// Applications with an upgrade available
    pub apps: Vec<AppUpdate>,
}

impl PendingUpdates {
    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.apps.is_empty()
    }
}

/// Catalog id of an instance: `wordpress__2` → `wordpress`
pub fn base_app_id(id: &str) -> &str {
    id.split_once("__").map_or(id, |(base, _)| base)
}

/// Whether the catalog revision is newer than the installed instance
///
/// Newer than the revision the instance came from, or newer than its last
/// upgrade time (install time when never upgraded). An instance with none of
/// these recorded is not considered outdated.
pub fn has_pending_update(installed: &InstalledApp, catalog: &CatalogApp) -> bool {
    let Some(latest) = catalog.last_update else {
        return false;
    };
    if installed.last_update.is_some_and(|revision| latest > revision) {
        return true;
    }
    match installed.update_time.or(installed.install_time) {
        Some(reference) => latest > reference,
        None => false,
    }
}

/// Refresh the package index and report pending updates
///
/// Never changes installed packages or applications.
pub async fn check_updates(
    ctx: &AdminContext,
    journal: &mut Journal,
    options: UpgradeOptions,
) -> Result<PendingUpdates> {
    let mut updates = PendingUpdates::default();

    if !options.ignore_packages {
        journal.info(MessageKey::UpdatingAptCache);
        if let Err(e) = ctx.packages.refresh_index().await {
            warn!(error = %e, "package index refresh failed");
            return Err(Error::CacheRefresh);
        }
        journal.info(MessageKey::Done);

        let changes = ctx.packages.simulate_upgrade().await?;
        for change in changes.pending() {
            let changelog = match ctx.packages.changelog(change).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(package = %change.name, error = %e, "changelog unavailable");
                    String::new()
                }
            };
            updates.packages.push(PackageUpdate {
                name: change.name.clone(),
                fullname: change.fullname.clone(),
                changelog,
            });
        }
    }

    if !options.ignore_apps {
        if let Err(e) = ctx.apps.refresh_catalog().await {
            warn!(error = %e, "catalog refresh failed, using cached catalog");
        }
        updates.apps = pending_apps(ctx).await?;
    }

    if updates.is_empty() {
        journal.info(MessageKey::PackagesNoUpgrade);
    }
    Ok(updates)
}

async fn pending_apps(ctx: &AdminContext) -> Result<Vec<AppUpdate>> {
    let mut apps = Vec::new();
    for id in ctx.apps.installed_ids().await? {
        let Some(catalog) = ctx.apps.catalog_app(base_app_id(&id)).await? else {
            debug!(%id, "not in any catalog");
            continue;
        };
        if catalog.last_update.is_none() || catalog.git.is_none() {
            debug!(%id, "catalog entry without revision information");
            continue;
        }
        let installed = match ctx.apps.installed_app(&id).await {
            Ok(installed) => installed,
            Err(e) => {
                warn!(%id, error = %e, "unreadable application settings");
                continue;
            }
        };
        if has_pending_update(&installed, &catalog) {
            apps.push(AppUpdate {
                label: installed.label.unwrap_or_else(|| id.clone()),
                id,
            });
        }
    }
    Ok(apps)
}
