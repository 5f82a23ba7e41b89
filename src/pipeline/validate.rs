use super::RequestContext;
use crate::error::ApiError;
use crate::schema::{Validate, ValidationError};

/// Final pipeline step: check the body against the schema chosen by `T`.
pub fn validate_body<T: Validate>(ctx: &RequestContext) -> Result<T, ApiError> {
    if let Some(reason) = ctx.body_error {
        return Err(ValidationError::body(reason).into());
    }
    T::validate(&ctx.body).map_err(|err| {
        tracing::info!(
            schema = T::SCHEMA,
            path = %ctx.path,
            ip = %ctx.identity,
            violations = err.fields.len(),
            "validation failed"
        );
        ApiError::from(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OptimizeRequest;
    use axum::http::Method;
    use serde_json::{json, Value};

    #[test]
    fn unparseable_body_reports_body_field() {
        let mut ctx = RequestContext::new(Method::POST, "/p", "ip", Value::Null);
        ctx.body_error = Some("request body is not valid JSON");
        match validate_body::<OptimizeRequest>(&ctx) {
            Err(ApiError::Validation(fields)) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "body");
                assert_eq!(fields[0].message, "request body is not valid JSON");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn scenario_short_prompt_is_rejected() {
        let ctx = RequestContext::new(
            Method::POST,
            "/api/prompts/optimize",
            "ip",
            json!({"prompt": "Short", "type": "optimize", "category": "general"}),
        );
        let err = validate_body::<OptimizeRequest>(&ctx).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
