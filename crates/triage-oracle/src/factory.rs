//! Oracle factory for building oracles from configuration.

use std::sync::Arc;

use thiserror::Error;

use triage_config::{BackendSpec, OracleConfig};
use triage_core::ClassificationOracle;

use crate::keyword::KeywordOracle;
use crate::llm::{HttpLlmClient, HttpLlmClientConfig, LlmClient, LlmError, MockLlmClient};
use crate::llm_oracle::{LlmOracle, LlmOracleConfig};
use crate::ollama::{OllamaClient, OllamaClientConfig};

/// Errors that can occur when building an oracle.
#[derive(Debug, Error)]
pub enum OracleBuildError {
    #[error("unknown oracle mode: {0}")]
    UnknownMode(String),
    #[error("unknown backend kind: {0}")]
    UnknownKind(String),
    #[error("environment variable '{0}' not found")]
    EnvNotFound(String),
    #[error("llm client error: {0}")]
    Client(#[from] LlmError),
}

/// Build the oracle selected by `oracle.mode`.
pub fn build_oracle(config: &OracleConfig) -> Result<Arc<dyn ClassificationOracle>, OracleBuildError> {
    match config.mode.to_lowercase().as_str() {
        "keyword" => Ok(Arc::new(KeywordOracle::new())),
        "llm" => {
            let client = build_llm_client(&config.backend)?;
            Ok(Arc::new(LlmOracle::new(
                client,
                LlmOracleConfig {
                    model: config.model.clone(),
                    temperature: config.temperature,
                },
            )))
        }
        other => Err(OracleBuildError::UnknownMode(other.to_string())),
    }
}

/// Build an LLM client from a backend spec.
pub fn build_llm_client(backend: &BackendSpec) -> Result<Arc<dyn LlmClient>, OracleBuildError> {
    match backend.kind.to_lowercase().as_str() {
        "openai" => {
            let defaults = HttpLlmClientConfig::default();
            let client = HttpLlmClient::new(HttpLlmClientConfig {
                endpoint: backend.endpoint.clone().unwrap_or(defaults.endpoint),
                api_key: resolve_api_key(backend)?,
                timeout_secs: backend.timeout_secs,
                extra_headers: defaults.extra_headers,
            })?;
            Ok(Arc::new(client))
        }
        "ollama" => {
            let defaults = OllamaClientConfig::default();
            let client = OllamaClient::new(OllamaClientConfig {
                endpoint: backend.endpoint.clone().unwrap_or(defaults.endpoint),
                timeout_secs: backend.timeout_secs,
            })?;
            Ok(Arc::new(client))
        }
        "mock" => Ok(Arc::new(MockLlmClient::new(
            backend
                .mock_response
                .clone()
                .unwrap_or_else(|| r#"{"category_ids":[]}"#.to_string()),
        ))),
        _ => Err(OracleBuildError::UnknownKind(backend.kind.clone())),
    }
}

/// Key from `api_key_env`; no variable configured means no key.
fn resolve_api_key(spec: &BackendSpec) -> Result<Option<String>, OracleBuildError> {
    match &spec.api_key_env {
        Some(env_name) => std::env::var(env_name)
            .map(Some)
            .map_err(|_| OracleBuildError::EnvNotFound(env_name.clone())),
        None => Ok(None),
    }
}
