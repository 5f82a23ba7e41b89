use std::sync::Arc;

use super::{RequestContext, Stage};
use crate::error::ApiError;
use crate::rate_limit::{Admission, RateLimiter};

/// Pipeline adapter around the shared [`RateLimiter`].
pub struct RateLimitStage {
    limiter: Arc<RateLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &str {
        "rate_limiter"
    }

    fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        match self.limiter.admit(&ctx.identity) {
            Admission::Admitted { remaining } => {
                tracing::trace!(ip = %ctx.identity, remaining, "rate limit admitted");
                Ok(())
            }
            Admission::Rejected { retry_after } => {
                tracing::warn!(
                    ip = %ctx.identity,
                    path = %ctx.path,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "rate limit exceeded"
                );
                Err(ApiError::RateLimited { retry_after })
            }
        }
    }
}
