//! Registry of hosted domains

use async_trait::async_trait;
use hostadmin_config::Attributes;
use std::sync::Arc;
use tracing::info;

use super::directory::{Directory, DirectoryEntry};
use crate::error::Result;

const DOMAINS_RDN: &str = "ou=domains";

/// Hosted domains
#[async_trait]
pub trait DomainRegistry: Send + Sync {
    /// Every registered domain
    async fn list(&self) -> Result<Vec<String>>;

    /// Register a new domain
    async fn register(&self, domain: &str) -> Result<()>;
}

/// Domains stored as `virtualdomain=<d>,ou=domains` directory entries
pub struct DirectoryDomainRegistry {
    directory: Arc<dyn Directory>,
}

impl DirectoryDomainRegistry {
    /// Create a registry over `directory`
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Directory entry describing `domain`
    pub fn entry(domain: &str) -> DirectoryEntry {
        let mut attributes = Attributes::new();
        attributes.insert("virtualdomain".into(), vec![domain.to_string()]);
        attributes.insert(
            "objectClass".into(),
            vec!["mailDomain".into(), "top".into()],
        );
        DirectoryEntry::new(format!("virtualdomain={},{}", domain, DOMAINS_RDN), attributes)
    }
}

#[async_trait]
impl DomainRegistry for DirectoryDomainRegistry {
    async fn list(&self) -> Result<Vec<String>> {
        self.directory
            .search_attribute(DOMAINS_RDN, "(objectClass=mailDomain)", "virtualdomain")
            .await
    }

    async fn register(&self, domain: &str) -> Result<()> {
        self.directory.add(&Self::entry(domain)).await?;
        info!(domain, "domain registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_entry() {
        let entry = DirectoryDomainRegistry::entry("example.org");
        assert_eq!(entry.rdn, "virtualdomain=example.org,ou=domains");
        assert_eq!(entry.attributes["virtualdomain"], vec!["example.org"]);
        assert_eq!(entry.attributes["objectClass"], vec!["mailDomain", "top"]);
    }
}
