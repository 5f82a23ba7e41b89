//! Transformation dispatcher.
//!
//! Each operation builds a system/user instruction pair, sends it to a
//! [`CompletionBackend`] with a mode-specific temperature and parses the
//! reply. A failed call is returned as [`UpstreamError`]; a reply that cannot
//! be parsed is replaced by a deterministic fallback that echoes the input,
//! so parse problems never escape this module. Nothing is cached and nothing
//! is retried.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::metrics::Metrics;
use crate::model::{ChatMessage, CompletionBackend, CompletionRequest, UpstreamError};
use crate::schema::{GenerateRequest, ImagePromptRequest, OptimizeRequest, RegenerateRequest};
use crate::util::strip_code_fence;

pub mod instructions;

pub const OPTIMIZE_TEMPERATURE: f32 = 0.3;
pub const GENERATE_TEMPERATURE: f32 = 0.7;
pub const REGENERATE_TEMPERATURE: f32 = 0.8;

pub const NOT_AVAILABLE: &str = "Not available";
pub const OPTIMIZE_FAILURE_NOTICE: &str = "Failed to optimize - API parsing error";
pub const GENERATE_FAILURE_NOTICE: &str = "Failed to generate - API parsing error";

/// The four labelled sections of a structured prompt. Sections the model
/// leaves out default to [`NOT_AVAILABLE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptStructure {
    #[serde(default = "not_available", deserialize_with = "lenient_text")]
    pub context: String,
    #[serde(default = "not_available", deserialize_with = "lenient_text")]
    pub task: String,
    #[serde(default = "not_available", deserialize_with = "lenient_text")]
    pub format: String,
    #[serde(default = "not_available", deserialize_with = "lenient_text")]
    pub examples: String,
}

impl Default for PromptStructure {
    fn default() -> Self {
        Self {
            context: not_available(),
            task: not_available(),
            format: not_available(),
            examples: not_available(),
        }
    }
}

impl PromptStructure {
    fn fallback(context: &str, task: &str, format: &str, examples: &str) -> Self {
        Self {
            context: context.to_string(),
            task: task.to_string(),
            format: format.to_string(),
            examples: examples.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPrompt {
    pub text: String,
    #[serde(default, deserialize_with = "lenient_structure")]
    pub structure: PromptStructure,
    #[serde(default, deserialize_with = "lenient_list")]
    pub improvements: Vec<String>,
}

impl OptimizedPrompt {
    pub fn fallback(original: &str) -> Self {
        Self {
            text: original.to_string(),
            structure: PromptStructure::fallback(
                "Original prompt",
                "No changes made",
                "As provided",
                NOT_AVAILABLE,
            ),
            improvements: vec![OPTIMIZE_FAILURE_NOTICE.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPrompt {
    pub text: String,
    #[serde(default, deserialize_with = "lenient_structure")]
    pub structure: PromptStructure,
    #[serde(default, deserialize_with = "lenient_list")]
    pub suggestions: Vec<String>,
}

impl GeneratedPrompt {
    pub fn fallback(requirements: &str) -> Self {
        Self {
            text: requirements.to_string(),
            structure: PromptStructure::fallback(
                "Original requirements",
                "Prompt generation failed",
                "Please retry",
                NOT_AVAILABLE,
            ),
            suggestions: vec![
                GENERATE_FAILURE_NOTICE.to_string(),
                "Check your requirements".to_string(),
                "Try again with different parameters".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVariation {
    pub text: String,
    #[serde(default, deserialize_with = "lenient_structure")]
    pub structure: PromptStructure,
}

impl PromptVariation {
    pub fn fallback(original: &str) -> Vec<Self> {
        vec![Self {
            text: original.to_string(),
            structure: PromptStructure::fallback(
                "Original prompt",
                "No variations generated",
                "As provided",
                NOT_AVAILABLE,
            ),
        }]
    }
}

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// Accept a string, a list of strings (joined by newlines) or null for a
/// structure section; models do not always honour the requested shape.
fn lenient_text<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Null => not_available(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    })
}

/// Accept a structure object; null or any other shape becomes the default.
fn lenient_structure<'de, D: Deserializer<'de>>(de: D) -> Result<PromptStructure, D::Error> {
    Ok(match Value::deserialize(de)? {
        value @ Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => PromptStructure::default(),
    })
}

/// Accept a list of strings or a single string.
fn lenient_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Array(items) => items.iter().map(value_text).collect(),
        Value::String(s) => vec![s],
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a model reply, tolerating a surrounding Markdown code fence.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

/// Builds model prompts, calls the injected backends and shapes the reply.
pub struct PromptService {
    text_backend: Arc<dyn CompletionBackend>,
    image_backend: Arc<dyn CompletionBackend>,
    metrics: Arc<Metrics>,
}

impl PromptService {
    pub fn new(
        text_backend: Arc<dyn CompletionBackend>,
        image_backend: Arc<dyn CompletionBackend>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            text_backend,
            image_backend,
            metrics,
        }
    }

    pub async fn optimize(&self, req: &OptimizeRequest) -> Result<OptimizedPrompt, UpstreamError> {
        let raw = self
            .call(
                &self.text_backend,
                "optimize",
                instructions::OPTIMIZE_SYSTEM,
                instructions::optimize_user(req),
                Some(OPTIMIZE_TEMPERATURE),
            )
            .await?;
        Ok(self.parse_or(&raw, "optimize", || OptimizedPrompt::fallback(&req.prompt)))
    }

    pub async fn generate(&self, req: &GenerateRequest) -> Result<GeneratedPrompt, UpstreamError> {
        let raw = self
            .call(
                &self.text_backend,
                "generate",
                instructions::GENERATE_SYSTEM,
                instructions::generate_user(req),
                Some(GENERATE_TEMPERATURE),
            )
            .await?;
        Ok(self.parse_or(&raw, "generate", || {
            GeneratedPrompt::fallback(&req.requirements)
        }))
    }

    pub async fn regenerate(
        &self,
        req: &RegenerateRequest,
    ) -> Result<Vec<PromptVariation>, UpstreamError> {
        let raw = self
            .call(
                &self.text_backend,
                "regenerate",
                instructions::REGENERATE_SYSTEM,
                instructions::regenerate_user(req),
                Some(REGENERATE_TEMPERATURE),
            )
            .await?;
        let variations: Vec<PromptVariation> =
            self.parse_or(&raw, "regenerate", || PromptVariation::fallback(&req.prompt));
        if variations.is_empty() {
            tracing::warn!(mode = "regenerate", "model returned no variations, using fallback");
            self.metrics.record_fallback();
            return Ok(PromptVariation::fallback(&req.prompt));
        }
        Ok(variations)
    }

    /// Single-paragraph image prompt from the gateway. The reply is plain
    /// text, so only transport failures or an empty reply are errors.
    pub async fn image_prompt(&self, req: &ImagePromptRequest) -> Result<String, UpstreamError> {
        let raw = self
            .call(
                &self.image_backend,
                "image",
                instructions::IMAGE_SYSTEM,
                instructions::image_user(req),
                None,
            )
            .await?;
        Ok(raw.trim().to_string())
    }

    async fn call(
        &self,
        backend: &Arc<dyn CompletionBackend>,
        mode: &'static str,
        system: &str,
        user: String,
        temperature: Option<f32>,
    ) -> Result<String, UpstreamError> {
        let request = CompletionRequest {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
        };
        let start = Instant::now();
        let result = backend.complete(request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.metrics.observe_upstream_ms(elapsed_ms);
        match &result {
            Ok(raw) => {
                tracing::debug!(backend = %backend.name(), mode, elapsed_ms, reply_len = raw.len(), "model call completed");
            }
            Err(err) => {
                self.metrics.record_upstream_error();
                tracing::error!(backend = %backend.name(), mode, elapsed_ms, error = %err, detail = ?err, "model call failed");
            }
        }
        result
    }

    fn parse_or<T: DeserializeOwned>(&self, raw: &str, mode: &'static str, fallback: impl FnOnce() -> T) -> T {
        match parse_reply::<T>(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.metrics.record_fallback();
                tracing::warn!(mode, error = %err, "failed to parse model reply, using fallback");
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, Complexity, PromptType};
    use std::sync::Mutex;

    /// Backend that returns one canned reply and remembers the request.
    struct CannedBackend {
        reply: Mutex<Option<Result<String, UpstreamError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl CannedBackend {
        fn new(reply: Result<String, UpstreamError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
            self.seen.lock().unwrap().push(request);
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(UpstreamError::EmptyResponse))
        }
    }

    fn service(backend: Arc<CannedBackend>) -> (PromptService, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        (
            PromptService::new(backend.clone(), backend, metrics.clone()),
            metrics,
        )
    }

    fn optimize_req() -> OptimizeRequest {
        OptimizeRequest {
            prompt: "Original prompt text".into(),
            prompt_type: PromptType::Optimize,
            category: Category::General,
            complexity: Complexity::Simple,
        }
    }

    #[tokio::test]
    async fn optimize_parses_structured_reply_at_low_temperature() {
        let backend = CannedBackend::new(Ok(serde_json::json!({
            "text": "Optimized prompt",
            "structure": {"context": "c", "task": "t", "format": "f", "examples": "e"},
            "improvements": ["Better clarity"]
        })
        .to_string()));
        let (svc, _) = service(backend.clone());
        let result = svc.optimize(&optimize_req()).await.unwrap();
        assert_eq!(result.text, "Optimized prompt");
        assert_eq!(result.improvements, vec!["Better clarity"]);
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, Some(OPTIMIZE_TEMPERATURE));
        assert_eq!(seen[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn optimize_falls_back_on_unparseable_reply() {
        let backend = CannedBackend::new(Ok("Invalid JSON response".into()));
        let (svc, metrics) = service(backend);
        let result = svc.optimize(&optimize_req()).await.unwrap();
        assert_eq!(result.text, "Original prompt text");
        assert!(result.improvements.contains(&OPTIMIZE_FAILURE_NOTICE.to_string()));
        assert_eq!(metrics.snapshot().fallbacks, 1);
    }

    #[tokio::test]
    async fn call_failure_is_returned_not_masked() {
        let backend = CannedBackend::new(Err(UpstreamError::MissingCredential));
        let (svc, metrics) = service(backend);
        let err = svc.optimize(&optimize_req()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::MissingCredential));
        assert_eq!(metrics.snapshot().upstream_errors, 1);
    }

    #[tokio::test]
    async fn null_structure_keeps_the_model_text() {
        let backend = CannedBackend::new(Ok(
            r#"{"text": "A great prompt", "structure": null, "suggestions": ["s"]}"#.into(),
        ));
        let (svc, metrics) = service(backend);
        let result = svc
            .generate(&GenerateRequest {
                requirements: "abcdef".into(),
                category: Category::General,
                complexity: Complexity::Intermediate,
            })
            .await
            .unwrap();
        assert_eq!(result.text, "A great prompt");
        assert_eq!(result.structure, PromptStructure::default());
        assert_eq!(result.suggestions, vec!["s"]);
        assert_eq!(metrics.snapshot().fallbacks, 0);
    }

    #[test]
    fn non_object_structure_is_defaulted() {
        let optimized: OptimizedPrompt =
            parse_reply(r#"{"text": "t", "structure": "free text", "improvements": []}"#).unwrap();
        assert_eq!(optimized.structure, PromptStructure::default());
        let variations: Vec<PromptVariation> =
            parse_reply(r#"[{"text": "v", "structure": [1, 2]}]"#).unwrap();
        assert_eq!(variations[0].structure, PromptStructure::default());
    }

    #[tokio::test]
    async fn partial_structure_is_defaulted_field_by_field() {
        let backend = CannedBackend::new(Ok(
            r#"```json
{"text": "Generated", "structure": {"task": "do it", "examples": ["one", "two"]}}
```"#
                .into(),
        ));
        let (svc, _) = service(backend.clone());
        let result = svc
            .generate(&GenerateRequest {
                requirements: "abcde".into(),
                category: Category::Creative,
                complexity: Complexity::Intermediate,
            })
            .await
            .unwrap();
        assert_eq!(result.text, "Generated");
        assert_eq!(result.structure.task, "do it");
        assert_eq!(result.structure.context, NOT_AVAILABLE);
        assert_eq!(result.structure.examples, "one\ntwo");
        assert!(result.suggestions.is_empty());
        assert_eq!(
            backend.seen.lock().unwrap()[0].temperature,
            Some(GENERATE_TEMPERATURE)
        );
    }

    #[tokio::test]
    async fn regenerate_returns_every_variation() {
        let backend = CannedBackend::new(Ok(serde_json::json!([
            {"text": "Variation 1", "structure": {"context": "c1"}},
            {"text": "Variation 2"}
        ])
        .to_string()));
        let (svc, _) = service(backend);
        let req = RegenerateRequest {
            prompt: "Original prompt".into(),
            prompt_type: PromptType::Regenerate,
            category: Category::Technical,
            complexity: Complexity::Advanced,
        };
        let variations = svc.regenerate(&req).await.unwrap();
        assert_eq!(variations.len(), 2);
        assert_eq!(variations[1].text, "Variation 2");
    }

    #[tokio::test]
    async fn regenerate_empty_list_falls_back() {
        let backend = CannedBackend::new(Ok("[]".into()));
        let (svc, _) = service(backend);
        let req = RegenerateRequest {
            prompt: "Original prompt".into(),
            prompt_type: PromptType::Optimize,
            category: Category::General,
            complexity: Complexity::Simple,
        };
        let variations = svc.regenerate(&req).await.unwrap();
        assert_eq!(variations, PromptVariation::fallback("Original prompt"));
    }

    #[tokio::test]
    async fn image_prompt_uses_backend_default_temperature() {
        let backend = CannedBackend::new(Ok("  A misty forest. High resolution 8k.\n".into()));
        let (svc, _) = service(backend.clone());
        let text = svc
            .image_prompt(&ImagePromptRequest {
                topic: "forest".into(),
            })
            .await
            .unwrap();
        assert_eq!(text, "A misty forest. High resolution 8k.");
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, None);
        assert_eq!(
            seen[0].messages[1].content,
            "Generate a detailed image prompt for: forest"
        );
    }

    #[test]
    fn reply_without_text_is_a_parse_failure() {
        assert!(parse_reply::<OptimizedPrompt>(r#"{"structure": {}}"#).is_err());
    }
}
