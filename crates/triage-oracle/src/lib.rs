//! Classification oracle implementations.
//!
//! This crate provides:
//! - LLM clients: OpenAI-compatible HTTP, Ollama, and a mock
//! - `LlmOracle`: prompts an LLM and parses its JSON reply
//! - `KeywordOracle`: deterministic rule-based fallback
//!
//! Use `build_oracle` to create an oracle from configuration.

mod factory;
mod keyword;
mod llm;
mod llm_oracle;
mod ollama;
mod prompts;

pub use factory::{build_llm_client, build_oracle, OracleBuildError};
pub use keyword::KeywordOracle;
pub use llm::{HttpLlmClient, HttpLlmClientConfig, LlmClient, LlmError, LlmRequest, MockLlmClient};
pub use llm_oracle::{LlmOracle, LlmOracleConfig};
pub use ollama::{OllamaClient, OllamaClientConfig};
