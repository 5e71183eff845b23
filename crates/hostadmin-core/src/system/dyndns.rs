//! Dynamic DNS registry client

use async_trait::async_trait;
use command_executor::CommandRunner;
use hostadmin_config::ToolsConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{framework_command, run_checked};
use crate::error::{Error, Result};

/// The zone a domain would be registered under, for domains of three labels
/// or more: `blog.nohost.me` → `nohost.me`
pub fn parent_zone(domain: &str) -> Option<&str> {
    if domain.split('.').count() < 3 {
        return None;
    }
    domain.split_once('.').map(|(_, parent)| parent)
}

/// Remote dynamic DNS registry
#[async_trait]
pub trait DyndnsRegistry: Send + Sync {
    /// Zones under which subdomains can be registered
    async fn eligible_zones(&self) -> Result<Vec<String>>;

    /// Whether `domain` can still be registered
    async fn is_available(&self, domain: &str) -> Result<bool>;

    /// Register `domain` for this server
    async fn subscribe(&self, domain: &str) -> Result<()>;
}

/// Registry reached over HTTP, subscription delegated to the framework
pub struct HttpDyndnsRegistry {
    runner: Arc<dyn CommandRunner>,
    config: Arc<ToolsConfig>,
}

impl HttpDyndnsRegistry {
    /// Create a registry client
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<ToolsConfig>) -> Self {
        Self { runner, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.dyndns.url.trim_end_matches('/'), path)
    }

    /// GET `url` on the blocking thread pool
    async fn get(&self, url: String) -> Result<reqwest::blocking::Response> {
        let timeout = Duration::from_secs(self.config.dyndns.timeout);
        debug!(%url, "querying dynamic DNS registry");
        smol::unblock(move || {
            reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?
                .get(url)
                .send()
        })
        .await
        .map_err(|e| Error::Network(e.to_string()))
    }
}

#[async_trait]
impl DyndnsRegistry for HttpDyndnsRegistry {
    async fn eligible_zones(&self) -> Result<Vec<String>> {
        let response = self.get(self.url("domains")).await?;
        smol::unblock(move || response.json::<Vec<String>>())
            .await
            .map_err(|e| Error::Network(e.to_string()))
    }

    async fn is_available(&self, domain: &str) -> Result<bool> {
        let response = self.get(self.url(&format!("test/{}", domain))).await?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    async fn subscribe(&self, domain: &str) -> Result<()> {
        let cmd = framework_command(&self.config, &["dyndns", "subscribe", "-d", domain]);
        run_checked(self.runner.as_ref(), &cmd).await?;
        info!(domain, "subscribed to dynamic DNS");
        Ok(())
    }
}
