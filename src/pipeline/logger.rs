use serde_json::Value;

use super::{RequestContext, Stage};
use crate::error::ApiError;

/// Body fields that carry user prompt text and are never logged verbatim.
const REDACTED_FIELDS: &[&str] = &["prompt", "requirements", "topic"];

/// Emits one structured event per request. Never rejects.
#[derive(Default)]
pub struct RequestLogger;

impl Stage for RequestLogger {
    fn name(&self) -> &str {
        "request_logger"
    }

    fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        tracing::info!(
            method = %ctx.method,
            path = %ctx.path,
            ip = %ctx.identity,
            user_agent = ?ctx.user_agent,
            body = %redacted_summary(&ctx.body),
            "incoming request"
        );
        Ok(())
    }
}

/// Copy of the body with prompt text replaced by `[REDACTED]`.
pub fn redacted_summary(body: &Value) -> Value {
    match body {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let shown = if REDACTED_FIELDS.contains(&key.as_str()) {
                        Value::String("[REDACTED]".into())
                    } else {
                        value.clone()
                    };
                    (key.clone(), shown)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_text_is_redacted() {
        let summary = redacted_summary(&json!({
            "prompt": "secret plan",
            "requirements": "more text",
            "category": "business"
        }));
        assert_eq!(
            summary,
            json!({
                "prompt": "[REDACTED]",
                "requirements": "[REDACTED]",
                "category": "business"
            })
        );
    }

    #[test]
    fn logger_never_rejects_or_mutates() {
        let body = json!({"prompt": "keep me"});
        let mut ctx = RequestContext::new(axum::http::Method::POST, "/x", "ip", body.clone());
        assert!(RequestLogger.apply(&mut ctx).is_ok());
        assert_eq!(ctx.body, body);
    }
}
