//! # Triage Config
//!
//! Single-file configuration for the triage service.
//! One `triage.yaml` configures the category source, the durable streams,
//! the classification oracle, logging and the HTTP listener. Deployment
//! environment variables (`REDIS_HOST`, `APP_ENV`, ...) override the file.

mod loader;

pub use loader::{
    apply_env_overrides, apply_process_env, load_config, load_config_from_str, validate_config,
    ConfigError,
};

use serde::Deserialize;

/// Backend name of the process-local stores.
pub const BACKEND_IN_MEMORY: &str = "in_memory";
/// Backend name of the Redis stores.
pub const BACKEND_REDIS: &str = "redis";

/// Top-level configuration schema.
#[derive(Debug, Clone, Deserialize)]
pub struct TriageConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub categories: CategoriesConfig,
    #[serde(default)]
    pub streams: StreamsConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            redis: RedisConfig::default(),
            categories: CategoriesConfig::default(),
            streams: StreamsConfig::default(),
            oracle: OracleConfig::default(),
            observability: ObservabilityConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl TriageConfig {
    /// Whether any store is backed by Redis.
    pub fn uses_redis(&self) -> bool {
        self.categories.backend == BACKEND_REDIS || self.streams.backend == BACKEND_REDIS
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

fn default_app_name() -> String {
    "triage".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

/// Redis connection settings shared by the Redis-backed stores.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub use_ssl: bool,
    /// Full URL; takes precedence over the individual fields.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            use_ssl: false,
            url: None,
        }
    }
}

impl RedisConfig {
    /// `redis[s]://[:password@]host:port/db`
    pub fn connection_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.to_string();
        }
        let scheme = if self.use_ssl { "rediss" } else { "redis" };
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "{}://:{}@{}:{}/{}",
                scheme, password, self.host, self.port, self.db
            ),
            None => format!("{}://{}:{}/{}", scheme, self.host, self.port, self.db),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
            || self.url.as_deref().is_some_and(url_has_password)
    }
}

fn url_has_password(url: &str) -> bool {
    url.split_once("://")
        .and_then(|(_, rest)| rest.split_once('@'))
        .map(|(userinfo, _)| userinfo.split_once(':').is_some_and(|(_, pw)| !pw.is_empty()))
        .unwrap_or(false)
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

/// Where the category tree is read from.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoriesConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Default cache key of the tree; requests may name another key.
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
    /// JSON file preloaded under `cache_key` when the backend is in-memory.
    #[serde(default)]
    pub seed_file: Option<String>,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            cache_key: default_cache_key(),
            seed_file: None,
        }
    }
}

fn default_cache_key() -> String {
    "categories:tree".to_string()
}

/// Durable stream backend and stream names.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamsConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_categorization_stream")]
    pub categorization: String,
    #[serde(default = "default_validation_stream")]
    pub validation: String,
    /// Approximate retention per stream; `null` keeps everything.
    #[serde(default = "default_max_len")]
    pub max_len: Option<usize>,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            categorization: default_categorization_stream(),
            validation: default_validation_stream(),
            max_len: default_max_len(),
        }
    }
}

fn default_categorization_stream() -> String {
    "reports:light-categorization".to_string()
}

fn default_validation_stream() -> String {
    "reports:predictive-validation".to_string()
}

fn default_max_len() -> Option<usize> {
    Some(10_000)
}

fn default_backend() -> String {
    BACKEND_IN_MEMORY.to_string()
}

/// Classification oracle selection.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// `llm` or `keyword`
    #[serde(default = "default_oracle_mode")]
    pub mode: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub backend: BackendSpec,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            mode: default_oracle_mode(),
            model: default_model(),
            temperature: default_temperature(),
            backend: BackendSpec::default(),
        }
    }
}

fn default_oracle_mode() -> String {
    "keyword".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

/// LLM backend used when `oracle.mode` is `llm`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSpec {
    /// `openai`, `ollama` or `mock`
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Canned reply of the `mock` backend.
    #[serde(default)]
    pub mock_response: Option<String>,
}

impl Default for BackendSpec {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            endpoint: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            mock_response: None,
        }
    }
}

fn default_backend_kind() -> String {
    "openai".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}
