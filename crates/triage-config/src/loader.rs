//! Configuration loading, environment overrides and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::{TriageConfig, BACKEND_IN_MEMORY, BACKEND_REDIS};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load configuration from a YAML file, apply the process environment and validate.
pub fn load_config(path: &Path) -> Result<TriageConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: TriageConfig = serde_yaml::from_str(&content)?;
    apply_process_env(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse and validate YAML text without consulting the environment.
pub fn load_config_from_str(content: &str) -> Result<TriageConfig, ConfigError> {
    let config: TriageConfig = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Apply overrides from the process environment.
pub fn apply_process_env(config: &mut TriageConfig) -> Result<(), ConfigError> {
    apply_env_overrides(config, |name| std::env::var(name).ok())
}

/// Apply deployment overrides read through `lookup`.
///
/// Recognised variables: `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`,
/// `REDIS_DB`, `REDIS_USE_SSL`, `APP_ENV`, `LOG_LEVEL`, `HOST`, `PORT`.
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut TriageConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(host) = var("REDIS_HOST") {
        config.redis.host = host;
    }
    if let Some(port) = var("REDIS_PORT") {
        config.redis.port = parse_env("REDIS_PORT", &port)?;
    }
    if let Some(password) = var("REDIS_PASSWORD") {
        config.redis.password = Some(password);
    }
    if let Some(db) = var("REDIS_DB") {
        config.redis.db = parse_env("REDIS_DB", &db)?;
    }
    if let Some(use_ssl) = var("REDIS_USE_SSL") {
        config.redis.use_ssl = use_ssl.trim().eq_ignore_ascii_case("true");
    }
    if let Some(env) = var("APP_ENV") {
        config.app.environment = env;
    }
    if let Some(level) = var("LOG_LEVEL") {
        config.observability.log_level = level.to_lowercase();
    }
    if let Some(host) = var("HOST") {
        config.server.host = host;
    }
    if let Some(port) = var("PORT") {
        config.server.port = parse_env("PORT", &port)?;
    }

    debug!(
        environment = %config.app.environment,
        redis_host = %config.redis.host,
        "applied environment overrides"
    );
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value '{}'", name, value)))
}

pub fn validate_config(config: &TriageConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    validate_backend("categories.backend", &config.categories.backend)?;
    validate_backend("streams.backend", &config.streams.backend)?;

    if config.categories.cache_key.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "categories.cache_key must not be empty".to_string(),
        ));
    }

    if config.streams.categorization.trim().is_empty()
        || config.streams.validation.trim().is_empty()
    {
        return Err(ConfigError::Invalid(
            "streams.categorization and streams.validation must not be empty".to_string(),
        ));
    }

    if config.streams.max_len == Some(0) {
        return Err(ConfigError::Invalid(
            "streams.max_len must be > 0 when set".to_string(),
        ));
    }

    validate_oracle(config)?;

    if config.observability.log_level.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "observability.log_level must not be empty".to_string(),
        ));
    }

    if config.app.is_production() && config.uses_redis() && !config.redis.has_password() {
        return Err(ConfigError::Invalid(
            "redis.password (REDIS_PASSWORD) is required in production".to_string(),
        ));
    }

    Ok(())
}

fn validate_backend(field: &str, backend: &str) -> Result<(), ConfigError> {
    match backend {
        BACKEND_IN_MEMORY | BACKEND_REDIS => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "{} '{}' is not supported (expected '{}' or '{}')",
            field, other, BACKEND_IN_MEMORY, BACKEND_REDIS
        ))),
    }
}

fn validate_oracle(config: &TriageConfig) -> Result<(), ConfigError> {
    let oracle = &config.oracle;
    match oracle.mode.as_str() {
        "keyword" => Ok(()),
        "llm" => {
            let kind = oracle.backend.kind.to_lowercase();
            if !matches!(kind.as_str(), "openai" | "ollama" | "mock") {
                return Err(ConfigError::Invalid(format!(
                    "oracle.backend.kind '{}' is not supported",
                    oracle.backend.kind
                )));
            }
            if oracle.model.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "oracle.model must not be empty".to_string(),
                ));
            }
            if !(0.0..=2.0).contains(&oracle.temperature) {
                return Err(ConfigError::Invalid(
                    "oracle.temperature must be within 0.0..=2.0".to_string(),
                ));
            }
            if oracle.backend.timeout_secs == 0 {
                return Err(ConfigError::Invalid(
                    "oracle.backend.timeout_secs must be > 0".to_string(),
                ));
            }
            Ok(())
        }
        other => Err(ConfigError::Invalid(format!(
            "oracle.mode '{}' is not supported (expected 'llm' or 'keyword')",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_validate_config_accepts_defaults() {
        assert!(validate_config(&TriageConfig::default()).is_ok());
    }

    #[test]
    fn test_yaml_sections_are_optional() {
        let config = load_config_from_str(
            r#"
app:
  name: resq-triage
streams:
  backend: redis
  max_len: 500
oracle:
  mode: llm
  backend:
    kind: ollama
    endpoint: http://localhost:11434
"#,
        )
        .unwrap();
        assert_eq!(config.app.name, "resq-triage");
        assert_eq!(config.streams.max_len, Some(500));
        assert_eq!(config.streams.categorization, "reports:light-categorization");
        assert_eq!(config.oracle.backend.kind, "ollama");
        assert!(config.uses_redis());
    }

    #[test]
    fn test_rejects_unknown_backend_and_mode() {
        let bad_backend = load_config_from_str("streams:\n  backend: kafka\n");
        assert!(matches!(bad_backend, Err(ConfigError::Invalid(_))));

        let bad_mode = load_config_from_str("oracle:\n  mode: dice\n");
        assert!(matches!(bad_mode, Err(ConfigError::Invalid(_))));

        let bad_kind = load_config_from_str("oracle:\n  mode: llm\n  backend:\n    kind: carrier-pigeon\n");
        assert!(matches!(bad_kind, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = TriageConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("REDIS_HOST", "cache.internal"),
                ("REDIS_PORT", "6380"),
                ("REDIS_USE_SSL", "TRUE"),
                ("LOG_LEVEL", "DEBUG"),
                ("PORT", "9000"),
                ("HOST", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.redis.host, "cache.internal");
        assert_eq!(config.redis.port, 6380);
        assert!(config.redis.use_ssl);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.server.port, 9000);
        // blank values leave the file setting alone
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_env_override_with_bad_number_is_invalid() {
        let mut config = TriageConfig::default();
        let result = apply_env_overrides(&mut config, env(&[("REDIS_PORT", "sixty")]));
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("REDIS_PORT")));
    }

    #[test]
    fn test_production_redis_requires_password() {
        let mut config = TriageConfig::default();
        config.streams.backend = BACKEND_REDIS.to_string();
        apply_env_overrides(&mut config, env(&[("APP_ENV", "production")])).unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(msg)) if msg.contains("REDIS_PASSWORD")
        ));

        apply_env_overrides(&mut config, env(&[("REDIS_PASSWORD", "pw")])).unwrap();
        assert!(validate_config(&config).is_ok());

        // in-memory stores need no password even in production
        let mut local = TriageConfig::default();
        local.app.environment = "production".to_string();
        assert!(validate_config(&local).is_ok());
    }

    #[test]
    fn test_load_config_reads_file() {
        let path = std::env::temp_dir().join(format!(
            "triage-config-test-{}.yaml",
            std::process::id()
        ));
        fs::write(&path, "categories:\n  cache_key: taxonomy:v2\n").unwrap();
        let loaded = load_config(&path);
        let _ = fs::remove_file(&path);

        let config = loaded.unwrap();
        assert_eq!(config.categories.cache_key, "taxonomy:v2");

        let missing = load_config(Path::new("/definitely/not/here.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config =
            load_config_from_str(include_str!("../../../configs/triage.yaml")).unwrap();
        assert_eq!(config.oracle.mode, "keyword");
        assert_eq!(config.oracle.backend.kind, "ollama");
        assert_eq!(
            config.categories.seed_file.as_deref(),
            Some("configs/categories.json")
        );
        assert_eq!(config.server.listen_addr(), "0.0.0.0:8000");
    }
}
