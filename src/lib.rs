//! Core library for Prompt Wizard. This module wires the request pipeline,
//! the prompt dispatcher and the HTTP handlers into one axum router.

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod rate_limit;
pub mod schema;
pub mod service;
pub mod templates;
pub mod util;

pub use config::AppConfig;
pub use error::{ApiError, ErrorResponse};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    ConnectInfo, DefaultBodyLimit, State,
};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::metrics::Metrics;
use crate::model::{CompletionBackend, OpenAiBackend};
use crate::pipeline::{Pipeline, RequestContext};
use crate::rate_limit::RateLimiter;
use crate::schema::{GenerateRequest, ImagePromptRequest, OptimizeRequest, RegenerateRequest};
use crate::service::{PromptService, PromptStructure};
use crate::util::{client_identity, truncate_for_log};

/// Characters of user input kept in error logs.
const LOG_INPUT_CHARS: usize = 50;

/// Shared application state. Cheap to clone; everything mutable sits behind
/// an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PromptService>,
    pub pipeline: Pipeline,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub trust_proxy: bool,
    pub max_request_bytes: usize,
    /// `None` allows any origin.
    pub cors_allow_origin: Option<HeaderValue>,
    pub sweep_interval: Duration,
}

/// Build state with the OpenAI-compatible HTTP backends described by `config`.
pub fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    if config.model.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; optimize, generate and regenerate will fail");
    }
    if config.gateway.api_key.is_none() {
        tracing::warn!("IMAGE_GATEWAY_API_KEY not set; image prompt generation will fail");
    }
    let text: Arc<dyn CompletionBackend> = Arc::new(OpenAiBackend::new(config.model.clone())?);
    let image: Arc<dyn CompletionBackend> = Arc::new(OpenAiBackend::new(config.gateway.clone())?);
    build_state_with_backends(&config, text, image)
}

/// Build state around caller-supplied backends.
pub fn build_state_with_backends(
    config: &AppConfig,
    text: Arc<dyn CompletionBackend>,
    image: Arc<dyn CompletionBackend>,
) -> anyhow::Result<AppState> {
    let cors_allow_origin = config
        .cors_allow_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .context("CORS_ALLOW_ORIGIN is not a valid header value")?;

    let metrics = Arc::new(Metrics::new());
    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let pipeline = Pipeline::standard(limiter.clone(), metrics.clone());
    let service = Arc::new(PromptService::new(text, image, metrics.clone()));

    Ok(AppState {
        service,
        pipeline,
        limiter,
        metrics,
        trust_proxy: config.trust_proxy,
        max_request_bytes: config.max_request_bytes,
        cors_allow_origin,
        sweep_interval: config.sweep_interval,
    })
}

/// Build state from environment variables; see [`AppConfig::from_env`].
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    tracing::info!(
        model = %config.model.model,
        image_model = %config.gateway.model,
        window_ms = config.rate_limit.window.as_millis() as u64,
        max_requests = config.rate_limit.max_requests,
        trust_proxy = config.trust_proxy,
        "configuration loaded"
    );
    build_state(config).map_err(|e| -> Box<dyn std::error::Error> { e.into() })
}

/// Build the axum router and attach handlers and layers.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    let cors = match state.cors_allow_origin.clone() {
        Some(origin) => cors.allow_origin(AllowOrigin::exact(origin)),
        None => cors.allow_origin(Any),
    };
    let max_request_bytes = state.max_request_bytes;

    Router::new()
        .route("/health", get(health_handler).fallback(not_found_handler))
        .route("/metrics", get(metrics_handler).fallback(not_found_handler))
        .route(
            "/api/prompts/optimize",
            post(optimize_handler).fallback(not_found_handler),
        )
        .route(
            "/api/prompts/generate",
            post(generate_handler).fallback(not_found_handler),
        )
        .route(
            "/api/prompts/regenerate",
            post(regenerate_handler).fallback(not_found_handler),
        )
        .route(
            "/api/prompts/image",
            post(image_handler).fallback(not_found_handler),
        )
        .route(
            "/api/prompts/templates",
            get(templates_handler).fallback(not_found_handler),
        )
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(cors)
        .with_state(state)
}

/// `{success: true, data}` envelope shared by every successful route.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> Success<T> {
    fn json(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeData {
    pub original: String,
    pub optimized: String,
    pub improvements: Vec<String>,
    pub structure: PromptStructure,
    pub copy_ready: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateData {
    pub prompt: String,
    pub structure: PromptStructure,
    pub suggestions: Vec<String>,
    pub copy_ready: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationData {
    pub text: String,
    pub structure: PromptStructure,
    pub copy_ready: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateData {
    pub original: String,
    pub variations: Vec<VariationData>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub generated_prompt: String,
    pub copy_ready: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: f64,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Pieces of the inbound request the pipeline needs, collected by each
/// mutating handler before the body is admitted.
struct Inbound {
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
}

impl Inbound {
    /// Turn the raw request into a pipeline context. Oversized bodies are
    /// refused here; other unusable bodies are carried through so the
    /// logger and rate limiter still see the request.
    fn into_context(self, state: &AppState) -> Result<RequestContext, ApiError> {
        let identity = client_identity(
            &self.headers,
            self.peer.map(|ConnectInfo(addr)| addr),
            state.trust_proxy,
        );
        let (body, body_error) = match self.payload {
            Ok(Json(body)) => (body, None),
            Err(rejection) => (Value::Null, Some(describe_rejection(state, rejection)?)),
        };
        let mut ctx = RequestContext::new(self.method, self.uri.path(), identity, body);
        ctx.body_error = body_error;
        ctx.user_agent = self
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ctx)
    }
}

fn describe_rejection(state: &AppState, rejection: JsonRejection) -> Result<&'static str, ApiError> {
    match rejection {
        JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        )) => {
            tracing::warn!(limit = state.max_request_bytes, "request body exceeded configured limit");
            Err(ApiError::PayloadTooLarge {
                limit: state.max_request_bytes,
            })
        }
        JsonRejection::MissingJsonContentType(_) => {
            Ok("request body must be JSON (Content-Type: application/json)")
        }
        JsonRejection::JsonSyntaxError(_) => Ok("request body is not valid JSON"),
        other => {
            tracing::debug!(rejection = %other, "unreadable request body");
            Ok("request body could not be read")
        }
    }
}

async fn optimize_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Success<OptimizeData>>, ApiError> {
    let mut ctx = Inbound { peer, method, uri, headers, payload }.into_context(&state)?;
    let req: OptimizeRequest = state.pipeline.admit(&mut ctx)?;
    let result = state.service.optimize(&req).await.map_err(|err| {
        tracing::error!(path = %ctx.path, ip = %ctx.identity, input = %truncate_for_log(&req.prompt, LOG_INPUT_CHARS), error = %err, "optimize failed");
        ApiError::ServiceUnavailable("Failed to optimize prompt")
    })?;
    tracing::info!(ip = %ctx.identity, original_len = req.prompt.chars().count(), optimized_len = result.text.chars().count(), "prompt optimized");
    Ok(Success::json(OptimizeData {
        original: req.prompt,
        optimized: result.text,
        improvements: result.improvements,
        structure: result.structure,
        copy_ready: true,
        timestamp: timestamp(),
    }))
}

async fn generate_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Success<GenerateData>>, ApiError> {
    let mut ctx = Inbound { peer, method, uri, headers, payload }.into_context(&state)?;
    let req: GenerateRequest = state.pipeline.admit(&mut ctx)?;
    let result = state.service.generate(&req).await.map_err(|err| {
        tracing::error!(path = %ctx.path, ip = %ctx.identity, input = %truncate_for_log(&req.requirements, LOG_INPUT_CHARS), error = %err, "generate failed");
        ApiError::ServiceUnavailable("Failed to generate prompt")
    })?;
    tracing::info!(ip = %ctx.identity, category = %req.category, complexity = %req.complexity, "prompt generated");
    Ok(Success::json(GenerateData {
        prompt: result.text,
        structure: result.structure,
        suggestions: result.suggestions,
        copy_ready: true,
        timestamp: timestamp(),
    }))
}

async fn regenerate_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Success<RegenerateData>>, ApiError> {
    let mut ctx = Inbound { peer, method, uri, headers, payload }.into_context(&state)?;
    let req: RegenerateRequest = state.pipeline.admit(&mut ctx)?;
    let variations = state.service.regenerate(&req).await.map_err(|err| {
        tracing::error!(path = %ctx.path, ip = %ctx.identity, input = %truncate_for_log(&req.prompt, LOG_INPUT_CHARS), error = %err, "regenerate failed");
        ApiError::ServiceUnavailable("Failed to regenerate prompt")
    })?;
    tracing::info!(ip = %ctx.identity, variations = variations.len(), "prompt regenerated");
    Ok(Success::json(RegenerateData {
        original: req.prompt,
        variations: variations
            .into_iter()
            .map(|v| VariationData {
                text: v.text,
                structure: v.structure,
                copy_ready: true,
            })
            .collect(),
        timestamp: timestamp(),
    }))
}

async fn image_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Success<ImageData>>, ApiError> {
    let mut ctx = Inbound { peer, method, uri, headers, payload }.into_context(&state)?;
    let req: ImagePromptRequest = state.pipeline.admit(&mut ctx)?;
    let generated = state.service.image_prompt(&req).await.map_err(|err| {
        tracing::error!(path = %ctx.path, ip = %ctx.identity, input = %truncate_for_log(&req.topic, LOG_INPUT_CHARS), error = %err, "image prompt failed");
        ApiError::from_gateway(&err, "Failed to generate image prompt")
    })?;
    Ok(Success::json(ImageData {
        generated_prompt: generated,
        copy_ready: true,
        timestamp: timestamp(),
    }))
}

async fn templates_handler() -> Result<Json<Success<Value>>, ApiError> {
    let catalog = serde_json::to_value(templates::list()).map_err(|err| {
        tracing::error!(error = %err, "failed to serialize template catalog");
        ApiError::ServiceUnavailable("Failed to fetch templates")
    })?;
    Ok(Success::json(catalog))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthData> {
    Json(HealthData {
        status: "healthy",
        timestamp: timestamp(),
        uptime: state.metrics.uptime_secs(),
    })
}

/// Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

async fn not_found_handler() -> ApiError {
    ApiError::NotFound
}
