use serde_json::Value;

use super::{RequestContext, Stage};
use crate::error::ApiError;

/// Free-text body fields rewritten by the sanitizer.
pub const SANITIZED_FIELDS: &[&str] = &["prompt", "requirements", "topic"];

/// Characters removed from free text.
pub const STRIPPED_CHARS: &[char] = &['<', '>', '"', '\'', '&'];

/// Rewrites recognised free-text fields in place. Non-string values and
/// every other field pass through untouched; validation reports them.
#[derive(Default)]
pub struct Sanitizer;

impl Stage for Sanitizer {
    fn name(&self) -> &str {
        "sanitizer"
    }

    fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        sanitize_body(&mut ctx.body);
        Ok(())
    }
}

pub fn sanitize_body(body: &mut Value) {
    let Some(map) = body.as_object_mut() else {
        return;
    };
    for field in SANITIZED_FIELDS {
        if let Some(Value::String(text)) = map.get_mut(*field) {
            *text = sanitize_text(text);
        }
    }
}

/// Remove every stripped character, then trim surrounding whitespace.
///
/// Removal runs first so that a character sitting next to whitespace at
/// either end cannot leave whitespace behind; a second pass is a no-op.
pub fn sanitize_text(input: &str) -> String {
    let bytes = input.as_bytes();
    let has_stripped = memchr::memchr3(b'<', b'>', b'&', bytes).is_some()
        || memchr::memchr2(b'"', b'\'', bytes).is_some();
    if !has_stripped {
        return input.trim().to_string();
    }
    let kept: String = input.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
    kept.trim().to_string()
}
