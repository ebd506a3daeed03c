//! Runtime wiring from a single `triage.yaml`.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{info, Instrument};

use triage_config::{
    load_config, ConfigError, ObservabilityConfig, TriageConfig, BACKEND_IN_MEMORY, BACKEND_REDIS,
};
use triage_core::{
    CategorySource, ClassificationOracle, DurableStream, RunContext, StoreError, ValidationRequest,
};
use triage_oracle::{build_oracle, OracleBuildError};
use triage_stores::{
    InMemoryCategorySource, InMemoryDurableStream, RedisCategorySource, RedisDurableStream,
};

use crate::categorizer::{CategorizationOutcome, Categorizer};
use crate::error::WorkflowError;
use crate::sink::StreamSink;
use crate::supervisor::{WorkflowHandle, WorkflowKind, WorkflowSupervisor};
use crate::validator::Validator;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Bootstrap errors
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("oracle build error: {0}")]
    OracleBuild(#[from] OracleBuildError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),
}

/// Report text to categorise.
#[derive(Debug, Clone)]
pub struct CategorizationRequest {
    pub title: String,
    pub description: String,
    /// Overrides `categories.cache_key`.
    pub cache_key: Option<String>,
}

/// Wired engines plus the supervisor that schedules them.
pub struct TriageRuntime {
    config: TriageConfig,
    source: Arc<dyn CategorySource>,
    stream: Arc<dyn DurableStream>,
    categorizer: Arc<Categorizer>,
    validator: Arc<Validator>,
    supervisor: WorkflowSupervisor,
}

impl TriageRuntime {
    /// Load the config file, initialise tracing and build the runtime.
    pub async fn from_config_path(path: impl AsRef<Path>) -> Result<Self, BootstrapError> {
        let config = load_config(path.as_ref())?;
        init_tracing_if_needed(&config.observability);
        Self::from_config(config).await
    }

    pub async fn from_config(config: TriageConfig) -> Result<Self, BootstrapError> {
        let source = build_category_source(&config).await?;
        let stream = build_stream(&config)?;
        let oracle = build_oracle(&config.oracle)?;
        info!(
            environment = %config.app.environment,
            categories_backend = %config.categories.backend,
            streams_backend = %config.streams.backend,
            oracle_mode = %config.oracle.mode,
            "triage runtime built"
        );
        Ok(Self::from_parts(config, source, stream, oracle))
    }

    /// Assemble a runtime from already-built collaborators.
    pub fn from_parts(
        config: TriageConfig,
        source: Arc<dyn CategorySource>,
        stream: Arc<dyn DurableStream>,
        oracle: Arc<dyn ClassificationOracle>,
    ) -> Self {
        let max_len = config.streams.max_len;
        let categorizer = Categorizer::new(oracle.clone()).with_sink(
            StreamSink::new(stream.clone(), config.streams.categorization.clone())
                .with_max_len(max_len),
        );
        let validator = Validator::new(oracle).with_sink(
            StreamSink::new(stream.clone(), config.streams.validation.clone())
                .with_max_len(max_len),
        );
        Self {
            config,
            source,
            stream,
            categorizer: Arc::new(categorizer),
            validator: Arc::new(validator),
            supervisor: WorkflowSupervisor::new(),
        }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn stream(&self) -> Arc<dyn DurableStream> {
        self.stream.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.supervisor.in_flight()
    }

    /// Run a categorisation to completion on the caller's task.
    pub async fn categorize_now(
        &self,
        request: &CategorizationRequest,
        ctx: &RunContext,
    ) -> Result<CategorizationOutcome, WorkflowError> {
        let key = request
            .cache_key
            .as_deref()
            .unwrap_or(&self.config.categories.cache_key);
        self.categorizer
            .categorize_from_source(
                self.source.as_ref(),
                key,
                &request.title,
                &request.description,
                ctx,
            )
            .instrument(ctx.span(WorkflowKind::Categorization.as_str()))
            .await
    }

    pub fn schedule_categorization(
        &self,
        request: CategorizationRequest,
        ctx: RunContext,
    ) -> WorkflowHandle {
        let categorizer = self.categorizer.clone();
        let source = self.source.clone();
        let key = request
            .cache_key
            .unwrap_or_else(|| self.config.categories.cache_key.clone());
        self.supervisor
            .spawn(WorkflowKind::Categorization, &ctx.clone(), async move {
                categorizer
                    .categorize_from_source(
                        source.as_ref(),
                        &key,
                        &request.title,
                        &request.description,
                        &ctx,
                    )
                    .await
            })
    }

    pub fn schedule_validation(&self, request: ValidationRequest, ctx: RunContext) -> WorkflowHandle {
        let validator = self.validator.clone();
        self.supervisor
            .spawn(WorkflowKind::Validation, &ctx.clone(), async move {
                validator.validate(&request, &ctx).await
            })
    }
}

async fn build_category_source(
    config: &TriageConfig,
) -> Result<Arc<dyn CategorySource>, BootstrapError> {
    match config.categories.backend.as_str() {
        BACKEND_IN_MEMORY => {
            let source = InMemoryCategorySource::new();
            if let Some(seed) = &config.categories.seed_file {
                let raw = tokio::fs::read_to_string(seed).await?;
                source.insert(config.categories.cache_key.clone(), raw)?;
                info!(seed_file = %seed, cache_key = %config.categories.cache_key, "seeded category tree");
            }
            Ok(Arc::new(source))
        }
        BACKEND_REDIS => Ok(Arc::new(RedisCategorySource::new(
            &config.redis.connection_url(),
        )?)),
        other => Err(BootstrapError::UnsupportedBackend(other.to_string())),
    }
}

fn build_stream(config: &TriageConfig) -> Result<Arc<dyn DurableStream>, BootstrapError> {
    match config.streams.backend.as_str() {
        BACKEND_IN_MEMORY => Ok(Arc::new(InMemoryDurableStream::new())),
        BACKEND_REDIS => Ok(Arc::new(RedisDurableStream::new(
            &config.redis.connection_url(),
        )?)),
        other => Err(BootstrapError::UnsupportedBackend(other.to_string())),
    }
}

/// Install the global subscriber once. `RUST_LOG` wins over
/// `observability.log_level`; `TRIAGE_LOG_FILE` over `observability.log_file`.
pub fn init_tracing_if_needed(observability: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let log_file_path = std::env::var("TRIAGE_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| observability.log_file.clone());
        let file_writer = log_file_path.as_deref().and_then(create_log_writer);
        let fallback_level = match observability.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" | "critical" => "error",
            _ => "info",
        };

        let make_filter = || {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        };

        match file_writer {
            Some(writer) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .try_init();
            }
            None => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .try_init();
            }
        }

        tracing::info!(
            log_level = %observability.log_level,
            log_file = log_file_path.as_deref().unwrap_or("(stdout)"),
            "tracing initialized"
        );
    });
}

fn create_log_writer(path: &str) -> Option<SharedFileMakeWriter> {
    use std::fs::{create_dir_all, OpenOptions};

    let file_path = Path::new(path);
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = create_dir_all(parent) {
                eprintln!(
                    "failed to create log directory '{}': {}",
                    parent.display(),
                    err
                );
                return None;
            }
        }
    }
    match OpenOptions::new().create(true).append(true).open(file_path) {
        Ok(file) => Some(SharedFileMakeWriter {
            file: Arc::new(std::sync::Mutex::new(file)),
        }),
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", file_path.display(), err);
            None
        }
    }
}

#[derive(Clone)]
struct SharedFileMakeWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

struct SharedFileWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedFileMakeWriter {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            file: self.file.clone(),
        }
    }
}

impl std::io::Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::write(&mut *file, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::flush(&mut *file)
    }
}
