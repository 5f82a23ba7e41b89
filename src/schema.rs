//! Request shapes accepted by the prompt routes and the validator that turns
//! a raw JSON body into one of them.
//!
//! Validation never stops at the first problem: every field is checked and
//! all violations are reported together so a client can fix its request in
//! one round trip. Optional enum fields are filled with their defaults only
//! when the client left them out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Closed set of string values accepted for an enum field.
pub trait Choice: Copy + PartialEq + 'static {
    fn as_str(self) -> &'static str;
    fn parse(raw: &str) -> Option<Self>;
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl Choice for $name {
            fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Subject area the prompt is written for.
    Category {
        Creative => "creative",
        Technical => "technical",
        Business => "business",
        Educational => "educational",
        General => "general",
    }
);

string_enum!(
    /// Target sophistication of the produced prompt.
    Complexity {
        Simple => "simple",
        Intermediate => "intermediate",
        Advanced => "advanced",
    }
);

string_enum!(
    /// The `type` field of optimize and regenerate requests.
    PromptType {
        Optimize => "optimize",
        Generate => "generate",
        Enhance => "enhance",
        Regenerate => "regenerate",
    }
);

impl Default for Category {
    fn default() -> Self {
        Category::General
    }
}

impl Default for Complexity {
    fn default() -> Self {
        Complexity::Intermediate
    }
}

const OPTIMIZE_TYPES: &[PromptType] = &[
    PromptType::Optimize,
    PromptType::Generate,
    PromptType::Enhance,
];

const PROMPT_MIN_CHARS: usize = 10;
const PROMPT_MAX_CHARS: usize = 2000;
const REQUIREMENTS_MIN_CHARS: usize = 5;
const REQUIREMENTS_MAX_CHARS: usize = 500;
const TOPIC_MIN_CHARS: usize = 3;
const TOPIC_MAX_CHARS: usize = 500;

/// A single field-level violation reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All violations found in one request body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed with {} field error(s)", .fields.len())]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn body(message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError::new("body", message)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizeRequest {
    pub prompt: String,
    #[serde(rename = "type")]
    pub prompt_type: PromptType,
    pub category: Category,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    pub requirements: String,
    pub category: Category,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegenerateRequest {
    pub prompt: String,
    #[serde(rename = "type")]
    pub prompt_type: PromptType,
    pub category: Category,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImagePromptRequest {
    pub topic: String,
}

/// Implemented by every request shape. The implementing type selects the
/// schema, so `OptimizeRequest::validate(body)` checks the optimize shape.
pub trait Validate: Sized {
    const SCHEMA: &'static str;

    fn validate(body: &Value) -> Result<Self, ValidationError>;
}

impl Validate for OptimizeRequest {
    const SCHEMA: &'static str = "optimize";

    fn validate(body: &Value) -> Result<Self, ValidationError> {
        let mut fields = FieldChecker::new(body)?;
        let prompt = fields.string("prompt", PROMPT_MIN_CHARS, PROMPT_MAX_CHARS);
        let prompt_type = fields.required_choice("type", OPTIMIZE_TYPES);
        let category = fields.optional_choice("category", Category::ALL);
        let complexity = fields.optional_choice("complexity", Complexity::ALL);
        fields.reject_unknown(&["prompt", "type", "category", "complexity"]);
        match (prompt, prompt_type) {
            (Some(prompt), Some(prompt_type)) if fields.is_clean() => Ok(Self {
                prompt,
                prompt_type,
                category: category.unwrap_or_default(),
                complexity: complexity.unwrap_or_default(),
            }),
            _ => Err(fields.into_error()),
        }
    }
}

impl Validate for GenerateRequest {
    const SCHEMA: &'static str = "generate";

    fn validate(body: &Value) -> Result<Self, ValidationError> {
        let mut fields = FieldChecker::new(body)?;
        let requirements =
            fields.string("requirements", REQUIREMENTS_MIN_CHARS, REQUIREMENTS_MAX_CHARS);
        let category = fields.optional_choice("category", Category::ALL);
        let complexity = fields.optional_choice("complexity", Complexity::ALL);
        fields.reject_unknown(&["requirements", "category", "complexity"]);
        match requirements {
            Some(requirements) if fields.is_clean() => Ok(Self {
                requirements,
                category: category.unwrap_or_default(),
                complexity: complexity.unwrap_or_default(),
            }),
            _ => Err(fields.into_error()),
        }
    }
}

impl Validate for RegenerateRequest {
    const SCHEMA: &'static str = "regenerate";

    fn validate(body: &Value) -> Result<Self, ValidationError> {
        let mut fields = FieldChecker::new(body)?;
        let prompt = fields.string("prompt", PROMPT_MIN_CHARS, PROMPT_MAX_CHARS);
        let prompt_type = fields.required_choice("type", PromptType::ALL);
        let category = fields.optional_choice("category", Category::ALL);
        let complexity = fields.optional_choice("complexity", Complexity::ALL);
        fields.reject_unknown(&["prompt", "type", "category", "complexity"]);
        match (prompt, prompt_type) {
            (Some(prompt), Some(prompt_type)) if fields.is_clean() => Ok(Self {
                prompt,
                prompt_type,
                category: category.unwrap_or_default(),
                complexity: complexity.unwrap_or_default(),
            }),
            _ => Err(fields.into_error()),
        }
    }
}

impl Validate for ImagePromptRequest {
    const SCHEMA: &'static str = "image";

    fn validate(body: &Value) -> Result<Self, ValidationError> {
        let mut fields = FieldChecker::new(body)?;
        let topic = fields.string("topic", TOPIC_MIN_CHARS, TOPIC_MAX_CHARS);
        fields.reject_unknown(&["topic"]);
        match topic {
            Some(topic) if fields.is_clean() => Ok(Self { topic }),
            _ => Err(fields.into_error()),
        }
    }
}

/// Walks one JSON object and accumulates violations instead of returning
/// on the first one.
struct FieldChecker<'a> {
    object: &'a Map<String, Value>,
    errors: Vec<FieldError>,
}

impl<'a> FieldChecker<'a> {
    fn new(body: &'a Value) -> Result<Self, ValidationError> {
        match body.as_object() {
            Some(object) => Ok(Self {
                object,
                errors: Vec::new(),
            }),
            None => Err(ValidationError::body("request body must be a JSON object")),
        }
    }

    fn string(&mut self, key: &str, min: usize, max: usize) -> Option<String> {
        let value = match self.object.get(key) {
            Some(value) => value,
            None => {
                self.fail(key, format!("\"{}\" is required", key));
                return None;
            }
        };
        let text = match value.as_str() {
            Some(text) => text,
            None => {
                self.fail(key, format!("\"{}\" must be a string", key));
                return None;
            }
        };
        // UTF-16 code units, as browsers count `maxlength`.
        let len = text.encode_utf16().count();
        if len == 0 {
            self.fail(key, format!("\"{}\" is not allowed to be empty", key));
            return None;
        }
        if len < min {
            self.fail(
                key,
                format!("\"{}\" length must be at least {} characters long", key, min),
            );
            return None;
        }
        if len > max {
            self.fail(
                key,
                format!(
                    "\"{}\" length must be less than or equal to {} characters long",
                    key, max
                ),
            );
            return None;
        }
        Some(text.to_string())
    }

    fn required_choice<T: Choice>(&mut self, key: &str, allowed: &[T]) -> Option<T> {
        if !self.object.contains_key(key) {
            self.fail(key, format!("\"{}\" is required", key));
            return None;
        }
        self.optional_choice(key, allowed)
    }

    fn optional_choice<T: Choice>(&mut self, key: &str, allowed: &[T]) -> Option<T> {
        let value = self.object.get(key)?;
        let parsed = value
            .as_str()
            .and_then(T::parse)
            .filter(|choice| allowed.contains(choice));
        if parsed.is_none() {
            let names: Vec<&str> = allowed.iter().map(|c| c.as_str()).collect();
            self.fail(
                key,
                format!("\"{}\" must be one of [{}]", key, names.join(", ")),
            );
        }
        parsed
    }

    fn reject_unknown(&mut self, known: &[&str]) {
        let unknown: Vec<String> = self
            .object
            .keys()
            .filter(|key| !known.contains(&key.as_str()))
            .cloned()
            .collect();
        for key in unknown {
            let message = format!("\"{}\" is not allowed", key);
            self.fail(&key, message);
        }
    }

    fn fail(&mut self, field: &str, message: String) {
        self.errors.push(FieldError::new(field, message));
    }

    fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn into_error(self) -> ValidationError {
        ValidationError {
            fields: self.errors,
        }
    }
}
