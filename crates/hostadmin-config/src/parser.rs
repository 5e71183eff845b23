//! Configuration parser with environment variable substitution

use crate::{ConfigError, Result, ToolsConfig};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid variable pattern"));

/// Load the configuration at `path`, or the defaults when it does not exist
pub fn load(path: impl AsRef<Path>) -> Result<ToolsConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(ToolsConfig::default());
    }
    parse_file(path)
}

/// Parse a YAML configuration file
pub fn parse_file(path: impl AsRef<Path>) -> Result<ToolsConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse YAML configuration from a string
pub fn parse_str(content: &str) -> Result<ToolsConfig> {
    let content = substitute_env_vars(content)?;
    let config: ToolsConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ToolsConfig) -> Result<()> {
    if config.version != "1.0" {
        return Err(ConfigError::ValidationError(format!(
            "Unsupported version: {}, expected 1.0",
            config.version
        )));
    }

    if config.framework_cli.is_empty() {
        return Err(invalid("framework_cli must name a program"));
    }
    if config.services.restart_order.is_empty() {
        return Err(invalid("services.restart_order must not be empty"));
    }
    if config.domain.files.is_empty() {
        return Err(invalid("domain.files must not be empty"));
    }
    if config.domain.main_subdomains.is_empty() {
        return Err(invalid("domain.main_subdomains must not be empty"));
    }
    if !config.dyndns.url.starts_with("http://") && !config.dyndns.url.starts_with("https://") {
        return Err(ConfigError::ValidationError(format!(
            "dyndns.url is not an http(s) URL: {}",
            config.dyndns.url
        )));
    }

    let schedule = &config.packages.deferred_schedule;
    if schedule.split_whitespace().count() != 5 {
        return Err(ConfigError::ValidationError(format!(
            "packages.deferred_schedule must have five fields: '{}'",
            schedule
        )));
    }

    for (name, value) in [
        ("packages.deferred_job", &config.packages.deferred_job),
        ("migration.deferred_job", &config.migration.deferred_job),
    ] {
        if value.is_empty() || value.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "{} must be a plain file name: '{}'",
                name, value
            )));
        }
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

/// Substitute environment variables in a string
///
/// Supports `${VAR}` and `${VAR:-default}`. Every unresolved variable is
/// reported in a single error.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    substitute_vars_with(input, |name| std::env::var(name).ok())
}

/// Substitute variables using `lookup` instead of the process environment
pub fn substitute_vars_with<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in VAR_PATTERN.captures_iter(input) {
        let full_match = &cap[0];
        let var_expr = &cap[1];

        // Handle default values: ${VAR:-default}
        let (var_name, default_value) = match var_expr.find(":-") {
            Some(pos) => (&var_expr[..pos], Some(&var_expr[pos + 2..])),
            None => (var_expr, None),
        };

        match lookup(var_name) {
            Some(value) => result = result.replace(full_match, &value),
            None => match default_value {
                Some(default) => result = result.replace(full_match, default),
                None => errors.push(var_name.to_string()),
            },
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::EnvVarNotFound(errors.join(", ")));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_substitution_with_defaults() {
        let vars: HashMap<&str, &str> = [("LDAP_HOST", "ldap.internal")].into_iter().collect();
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());

        let out = substitute_vars_with("uri: ldap://${LDAP_HOST}:${LDAP_PORT:-389}", lookup).unwrap();
        assert_eq!(out, "uri: ldap://ldap.internal:389");
    }

    #[test]
    fn test_substitution_reports_all_missing() {
        let err = substitute_vars_with("${A} ${B} ${C:-c}", |_| None).unwrap_err();
        match err {
            ConfigError::EnvVarNotFound(names) => assert_eq!(names, "A, B"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_bad_schedule() {
        let mut config = ToolsConfig::default();
        config.packages.deferred_schedule = "hourly".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_job_name_with_slash() {
        let mut config = ToolsConfig::default();
        config.migration.deferred_job = "../passwd".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        validate_config(&ToolsConfig::default()).unwrap();
    }
}
