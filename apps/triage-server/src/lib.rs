use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use triage_core::{RunContext, ValidationRequest};
use triage_runtime::{CategorizationRequest, TriageRuntime, WorkflowError};

pub mod cli;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Correlation id of the current request, set by the middleware.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

#[derive(Clone)]
struct AppState {
    runtime: Arc<TriageRuntime>,
}

#[derive(Debug, Deserialize)]
struct CategorizeBody {
    report_id: String,
    title: String,
    description: String,
    #[serde(default)]
    cache_key: Option<String>,
    #[serde(default)]
    evidence_id: Option<String>,
}

impl CategorizeBody {
    fn into_parts(self, correlation_id: String) -> (RunContext, CategorizationRequest) {
        let mut ctx =
            RunContext::for_report(self.report_id).with_correlation_id(Some(correlation_id));
        if let Some(evidence_id) = self.evidence_id {
            ctx = ctx.with_evidence_id(evidence_id);
        }
        (
            ctx,
            CategorizationRequest {
                title: self.title,
                description: self.description,
                cache_key: self.cache_key,
            },
        )
    }
}

#[derive(Debug, Serialize)]
struct CategorizeResponse {
    message: String,
    categories: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ScheduledResponse {
    message: String,
    run_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

pub fn build_router(runtime: Arc<TriageRuntime>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/reports/light-categorize", post(light_categorize))
        .route(
            "/v1/reports/light-categorize/async",
            post(light_categorize_async),
        )
        .route(
            "/v1/reports/predictive-validation",
            post(predictive_validation),
        )
        .layer(middleware::from_fn(correlation_id))
        .with_state(AppState { runtime })
}

pub async fn run_server(config: PathBuf, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let runtime = Arc::new(
        TriageRuntime::from_config_path(&config)
            .await
            .with_context(|| format!("build runtime from '{}' failed", config.display()))?,
    );
    let listen = match listen {
        Some(addr) => addr,
        None => runtime
            .config()
            .server
            .listen_addr()
            .parse()
            .context("invalid server.host/server.port")?,
    };

    let app = build_router(runtime);
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .context("bind server listener failed")?;
    info!(listen = %listen, "triage-server listening");
    axum::serve(listener, app)
        .await
        .context("server terminated with error")
}

/// Reuse the caller's `X-Correlation-ID` or mint one, and echo it back.
async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    request.extensions_mut().insert(CorrelationId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "in_flight": state.runtime.in_flight()}))
}

async fn light_categorize(
    State(state): State<AppState>,
    Extension(CorrelationId(correlation_id)): Extension<CorrelationId>,
    Json(body): Json<CategorizeBody>,
) -> Result<Json<CategorizeResponse>, (StatusCode, Json<ErrorBody>)> {
    let (ctx, request) = body.into_parts(correlation_id);
    let outcome = state
        .runtime
        .categorize_now(&request, &ctx)
        .await
        .map_err(map_workflow_error)?;
    Ok(Json(CategorizeResponse {
        message: "All tags have been pushed to stream".to_string(),
        categories: outcome.slugs(),
    }))
}

async fn light_categorize_async(
    State(state): State<AppState>,
    Extension(CorrelationId(correlation_id)): Extension<CorrelationId>,
    Json(body): Json<CategorizeBody>,
) -> impl IntoResponse {
    let (ctx, request) = body.into_parts(correlation_id);
    let handle = state.runtime.schedule_categorization(request, ctx);
    (
        StatusCode::ACCEPTED,
        Json(ScheduledResponse {
            message: "Categorization scheduled; results will be pushed to stream".to_string(),
            run_id: handle.ticket.run_id,
        }),
    )
}

async fn predictive_validation(
    State(state): State<AppState>,
    Extension(CorrelationId(correlation_id)): Extension<CorrelationId>,
    Json(request): Json<ValidationRequest>,
) -> impl IntoResponse {
    let ctx = RunContext::for_report(request.report_id.to_string())
        .with_correlation_id(Some(correlation_id));
    let handle = state.runtime.schedule_validation(request, ctx);
    (
        StatusCode::ACCEPTED,
        Json(ScheduledResponse {
            message: "Validation scheduled; the verdict will be pushed to stream".to_string(),
            run_id: handle.ticket.run_id,
        }),
    )
}

fn map_workflow_error(err: WorkflowError) -> (StatusCode, Json<ErrorBody>) {
    let (status, code) = match &err {
        WorkflowError::Retrieval(_) => (StatusCode::SERVICE_UNAVAILABLE, "retrieval_failed"),
        WorkflowError::Stream(_) | WorkflowError::Codec(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "stream_failed")
        }
    };
    error!(error = %err, code, "categorization request failed");
    (
        status,
        Json(ErrorBody {
            code: code.to_string(),
            message: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use triage_config::TriageConfig;
    use triage_core::codec::decode;
    use triage_oracle::KeywordOracle;
    use triage_stores::{InMemoryCategorySource, InMemoryDurableStream};

    const TREE: &str = r#"[
      {"id":1,"name":"Fire","slug":"fire","description":"Buildings or vegetation burning"},
      {"id":2,"name":"Flooding","slug":"flooding","description":"Water over roads or homes"}
    ]"#;

    fn runtime() -> Arc<TriageRuntime> {
        let config = TriageConfig::default();
        let source = InMemoryCategorySource::with_entry(config.categories.cache_key.clone(), TREE);
        Arc::new(TriageRuntime::from_parts(
            config,
            Arc::new(source),
            Arc::new(InMemoryDurableStream::new()),
            Arc::new(KeywordOracle::new()),
        ))
    }

    fn post_json(uri: &str, body: Value) -> HttpRequest<Body> {
        HttpRequest::post(uri)
            .header("content-type", "application/json")
            .header(CORRELATION_HEADER, "corr-1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_generates_correlation_id() {
        let response = build_router(runtime())
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        let body = body_json(response).await;
        assert_eq!(body, json!({"status": "ok", "in_flight": 0}));
    }

    #[tokio::test]
    async fn test_light_categorize_returns_slugs_and_publishes() {
        let runtime = runtime();
        let response = build_router(runtime.clone())
            .oneshot(post_json(
                "/v1/reports/light-categorize",
                json!({
                    "report_id": "r-1",
                    "evidence_id": "ev-3",
                    "title": "Kitchen fire",
                    "description": "smoke everywhere"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CORRELATION_HEADER], "corr-1");
        let body = body_json(response).await;
        assert_eq!(body["categories"], json!(["fire"]));

        let stream = &runtime.config().streams.categorization;
        let records = runtime.stream().range(stream, None).await.unwrap();
        let last = decode(&records.last().unwrap().fields);
        assert_eq!(last["is_final"], true);
        assert_eq!(last["correlation_id"], "corr-1");
        assert_eq!(last["evidence_id"], "ev-3");
    }

    #[tokio::test]
    async fn test_missing_tree_is_service_unavailable() {
        let response = build_router(runtime())
            .oneshot(post_json(
                "/v1/reports/light-categorize",
                json!({"report_id": "r-1", "title": "t", "description": "d", "cache_key": "categories:other"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "retrieval_failed");
    }

    #[tokio::test]
    async fn test_async_routes_accept() {
        let router = build_router(runtime());

        let response = router
            .clone()
            .oneshot(post_json(
                "/v1/reports/light-categorize/async",
                json!({"report_id": "r-2", "title": "Road flooding", "description": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(body_json(response).await["run_id"].is_string());

        let response = router
            .oneshot(post_json(
                "/v1/reports/predictive-validation",
                json!({
                    "report_id": 7,
                    "report_title": "Road flooding",
                    "report_summary": "Water over the road",
                    "categories": ["flooding"],
                    "deterministic_validation": {
                        "trust_score": 90,
                        "is_valid": true,
                        "issues": [],
                        "inferences": [],
                        "metadata": {
                            "reporter_history_count": 3,
                            "rejected_reports_count": 0,
                            "device_fingerprint_match": true,
                            "average_evidence_distance": 0.1,
                            "report_frequency_score": 5
                        },
                        "issues_count": 0,
                        "inferences_count": 0
                    }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let response = build_router(runtime())
            .oneshot(post_json(
                "/v1/reports/light-categorize",
                json!({"title": "no report id"}),
            ))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
