//! Declarative directory tree (`ldap_scheme.yml`)
//!
//! The scheme lists `parents` and `children` entries, each keyed by its
//! relative distinguished name. Declaration order is preserved: parents are
//! created in file order, then children in file order.

use crate::{ConfigError, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;

/// Attribute name to its values, in declaration order
pub type Attributes = IndexMap<String, Vec<String>>;

/// The parsed directory tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LdapScheme {
    /// Top-level entries, created first
    pub parents: IndexMap<String, Attributes>,
    /// Entries below the parents
    pub children: IndexMap<String, Attributes>,
}

#[derive(Deserialize)]
struct RawScheme {
    #[serde(default)]
    parents: IndexMap<String, IndexMap<String, Value>>,
    #[serde(default)]
    children: IndexMap<String, IndexMap<String, Value>>,
}

impl LdapScheme {
    /// Parse a scheme file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a scheme from YAML text
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawScheme = serde_yaml::from_str(content)?;
        Ok(Self {
            parents: normalize_entries(raw.parents)?,
            children: normalize_entries(raw.children)?,
        })
    }

    /// All entries, parents first
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Attributes)> {
        self.parents.iter().chain(self.children.iter())
    }
}

fn normalize_entries(
    raw: IndexMap<String, IndexMap<String, Value>>,
) -> Result<IndexMap<String, Attributes>> {
    raw.into_iter()
        .map(|(rdn, attrs)| {
            let attrs = attrs
                .into_iter()
                .map(|(name, value)| {
                    let values = scalar_values(&rdn, &name, value)?;
                    Ok((name, values))
                })
                .collect::<Result<Attributes>>()?;
            Ok((rdn, attrs))
        })
        .collect()
}

fn scalar_values(rdn: &str, attr: &str, value: Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| scalar(rdn, attr, item))
            .collect(),
        other => Ok(vec![scalar(rdn, attr, other)?]),
    }
}

fn scalar(rdn: &str, attr: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ConfigError::ValidationError(format!(
            "attribute '{}' of '{}' must be a scalar or a list of scalars",
            attr, rdn
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEME: &str = r#"
parents:
  ou=users:
    ou: users
    objectClass:
      - organizationalUnit
      - top
  ou=domains:
    ou: domains
    objectClass: [organizationalUnit, top]
children:
  cn=admins,ou=groups:
    cn: admins
    gidNumber: 4001
    memberUid: admin
    objectClass: [posixGroup, top]
"#;

    #[test]
    fn test_order_and_normalization() {
        let scheme = LdapScheme::parse(SCHEME).unwrap();

        let parents: Vec<_> = scheme.parents.keys().cloned().collect();
        assert_eq!(parents, vec!["ou=users", "ou=domains"]);

        let admins = &scheme.children["cn=admins,ou=groups"];
        assert_eq!(admins["gidNumber"], vec!["4001"]);
        assert_eq!(admins["objectClass"], vec!["posixGroup", "top"]);

        let all: Vec<_> = scheme.entries().map(|(rdn, _)| rdn.as_str()).collect();
        assert_eq!(all, vec!["ou=users", "ou=domains", "cn=admins,ou=groups"]);
    }

    #[test]
    fn test_nested_mapping_rejected() {
        let err = LdapScheme::parse("parents:\n  ou=x:\n    ou:\n      nested: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
