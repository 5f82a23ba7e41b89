//! Request pipeline in front of every mutating route.
//!
//! Stages run in a fixed order: request logger, rate limiter, sanitizer.
//! Each stage may observe or rewrite the [`RequestContext`] or reject the
//! request, which stops the pipeline. Schema validation closes the pipeline
//! and produces the typed request the handler works with.

use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::rate_limit::RateLimiter;
use crate::schema::Validate;

pub mod limiter;
pub mod logger;
pub mod sanitize;
pub mod validate;

use self::limiter::RateLimitStage;
use self::logger::RequestLogger;
use self::sanitize::Sanitizer;

/// Everything the stages need to know about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub identity: String,
    pub user_agent: Option<String>,
    /// Parsed JSON body; `Value::Null` when the body could not be parsed.
    pub body: Value,
    /// Set when the body was not usable JSON.
    pub body_error: Option<&'static str>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, identity: impl Into<String>, body: Value) -> Self {
        Self {
            method,
            path: path.into(),
            identity: identity.into(),
            user_agent: None,
            body,
            body_error: None,
        }
    }
}

/// A single pipeline step. Returning an error rejects the request.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>, metrics: Arc<Metrics>) -> Self {
        Self { stages, metrics }
    }

    /// Logger, rate limiter and sanitizer, in that order.
    pub fn standard(limiter: Arc<RateLimiter>, metrics: Arc<Metrics>) -> Self {
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(RequestLogger),
            Arc::new(RateLimitStage::new(limiter)),
            Arc::new(Sanitizer),
        ];
        Self::new(stages, metrics)
    }

    /// Run every stage, then validate the (sanitized) body against `T`.
    pub fn admit<T: Validate>(&self, ctx: &mut RequestContext) -> Result<T, ApiError> {
        self.metrics.record_request();
        for stage in &self.stages {
            tracing::trace!(stage = %stage.name(), path = %ctx.path, "running pipeline stage");
            if let Err(err) = stage.apply(ctx) {
                self.record_rejection(&err);
                tracing::info!(
                    stage = %stage.name(),
                    path = %ctx.path,
                    ip = %ctx.identity,
                    status = err.status().as_u16(),
                    "request rejected"
                );
                return Err(err);
            }
        }
        validate::validate_body::<T>(ctx).map_err(|err| {
            self.record_rejection(&err);
            err
        })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    fn record_rejection(&self, err: &ApiError) {
        match err {
            ApiError::RateLimited { .. } => self.metrics.record_rate_limited(),
            ApiError::Validation(_) => self.metrics.record_validation_failure(),
            _ => {}
        }
    }
}
