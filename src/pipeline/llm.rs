//! Answer service: send a question to a generative model and return its text.
//!
//! The module is thin; the answer format is defined by the
//! system instruction in [`crate::prompts`], injected through
//! [`crate::config::TutorConfig`], so it can change without touching the
//! HTTP or error-mapping logic here.
//!
//! ## One attempt per submission
//!
//! Unlike batch pipelines there is no retry loop: a student waiting on a
//! spinner is better served by an immediate, readable error than by a
//! silent 10-second backoff. Every failure is mapped to a
//! [`TutorError`] service variant at this boundary.
//!
//! ## Implementations
//!
//! * [`GeminiClient`] speaks the Gemini `generateContent` REST format
//!   directly (content parts + `systemInstruction`).
//! * [`ProviderService`] adapts any [`edgequake_llm::LLMProvider`] so the
//!   same session can run against OpenAI, Anthropic, Ollama, …

use crate::config::TutorConfig;
use crate::error::TutorError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ── Wire types ───────────────────────────────────────────────────────────

/// Base64 image payload with its declared MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub data: String,
    pub mime_type: String,
}

/// One unit of a multimodal request.
///
/// Serialises to `{ "text": … }` or `{ "inlineData": { "data": …, "mimeType": … } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn inline(data: InlineData) -> Self {
        ContentPart::InlineData { inline_data: data }
    }
}

/// Everything an [`AnswerService`] needs for one call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub parts: Vec<ContentPart>,
    pub system_instruction: Arc<str>,
}

/// The model's answer plus usage accounting, when the provider reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    /// Response text, verbatim.
    pub text: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// A remote model that can answer a [`GenerateRequest`].
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Short provider label used in logs and error messages.
    fn name(&self) -> &str;

    /// Make exactly one call to the model.
    async fn generate(&self, request: &GenerateRequest) -> Result<ServiceResponse, TutorError>;
}

// ── Gemini REST client ───────────────────────────────────────────────────

/// Native client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl GeminiClient {
    /// Build a client from the config.
    ///
    /// A missing API key is not an error here; the first [`generate`] call
    /// reports it.
    ///
    /// [`generate`]: AnswerService::generate
    pub fn new(config: &TutorConfig) -> Result<Self, TutorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| TutorError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn body<'a>(&self, request: &'a GenerateRequest) -> GenerateContentBody<'a> {
        let generation_config = if self.temperature.is_some() || self.max_tokens.is_some() {
            Some(GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            })
        } else {
            None
        };

        GenerateContentBody {
            contents: [Content {
                role: "user",
                parts: &request.parts,
            }],
            system_instruction: SystemInstruction {
                parts: [TextPart {
                    text: &request.system_instruction,
                }],
            },
            generation_config,
        }
    }
}

#[async_trait]
impl AnswerService for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<ServiceResponse, TutorError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TutorError::ProviderNotConfigured {
                provider: "gemini".into(),
                hint: "Set GEMINI_API_KEY (or pass --api-key) to call the Gemini API.".into(),
            })?;

        let start = Instant::now();
        info!(
            "Calling {} with {} content part(s)",
            self.model,
            request.parts.len()
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| map_transport_error(e, start))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini returned {}: {}", status, body);
            return Err(map_status(status, retry_after_secs, &body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, start))?;

        let result = parsed.into_service_response();
        if let Ok(ref r) = result {
            debug!(
                "Gemini answered in {:?}: {} chars, tokens {:?} in / {:?} out",
                start.elapsed(),
                r.text.len(),
                r.input_tokens,
                r.output_tokens
            );
        }
        result
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: [Content<'a>; 1],
    system_instruction: SystemInstruction<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: &'a [ContentPart],
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    /// Thinking models may return their reasoning as separate parts.
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    status: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenate the text of the first candidate, skipping thought parts.
    fn into_service_response(self) -> Result<ServiceResponse, TutorError> {
        let (input_tokens, output_tokens) = self
            .usage_metadata
            .map(|u| (u.prompt_token_count, u.candidates_token_count))
            .unwrap_or((None, None));

        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(TutorError::EmptyResponse {
                reason: block_reason
                    .map(|r| format!("prompt blocked: {r}"))
                    .unwrap_or_else(|| "no candidates".into()),
            });
        };

        let text: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(TutorError::EmptyResponse {
                reason: candidate
                    .finish_reason
                    .unwrap_or_else(|| "no text in candidate".into()),
            });
        }

        Ok(ServiceResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }
}

fn map_transport_error(e: reqwest::Error, start: Instant) -> TutorError {
    if e.is_timeout() {
        TutorError::ApiTimeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    } else if e.is_decode() {
        TutorError::LlmApiError {
            message: format!("invalid response body: {e}"),
        }
    } else {
        TutorError::LlmApiError {
            message: format!("request failed: {e}"),
        }
    }
}

/// Map a non-2xx response onto a service error.
fn map_status(status: StatusCode, retry_after_secs: Option<u64>, body: &str) -> TutorError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| match b.error.status {
            Some(s) => format!("{} ({s})", b.error.message),
            None => b.error.message,
        })
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.to_string()
            } else {
                trimmed.chars().take(300).collect()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TutorError::AuthError {
            provider: "gemini".into(),
            detail,
        },
        StatusCode::TOO_MANY_REQUESTS => TutorError::RateLimitExceeded {
            provider: "gemini".into(),
            retry_after_secs,
        },
        _ => TutorError::LlmApiError {
            message: format!("HTTP {}: {detail}", status.as_u16()),
        },
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Adapter running questions through any [`LLMProvider`].
///
/// Text parts are joined into one user message and images ride along as
/// attachments on that message; the system instruction becomes a system
/// message.
pub struct ProviderService {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    timeout: Duration,
}

impl ProviderService {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &TutorConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    fn build_messages(request: &GenerateRequest) -> Vec<ChatMessage> {
        let (text, images) = flatten_parts(&request.parts);
        let images = images
            .into_iter()
            .map(|d| ImageData::new(d.data.clone(), d.mime_type.clone()))
            .collect();

        vec![
            ChatMessage::system(request.system_instruction.to_string()),
            ChatMessage::user_with_images(text.as_str(), images),
        ]
    }
}

/// Join text parts with a blank line, in order; collect the images.
fn flatten_parts(parts: &[ContentPart]) -> (String, Vec<&InlineData>) {
    let mut text = String::new();
    let mut images = Vec::new();
    for part in parts {
        match part {
            ContentPart::Text { text: t } => {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(t);
            }
            ContentPart::InlineData { inline_data } => images.push(inline_data),
        }
    }
    (text, images)
}

#[async_trait]
impl AnswerService for ProviderService {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<ServiceResponse, TutorError> {
        let messages = Self::build_messages(request);
        let options = CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        };

        let start = Instant::now();
        info!(
            "Calling provider '{}' with {} content part(s)",
            self.label,
            request.parts.len()
        );

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| TutorError::ApiTimeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })?
            .map_err(|e| TutorError::LlmApiError {
                message: format!("{}", e),
            })?;

        debug!(
            "Provider '{}' answered in {:?}: {} input tokens, {} output tokens",
            self.label,
            start.elapsed(),
            response.prompt_tokens,
            response.completion_tokens
        );

        if response.content.is_empty() {
            return Err(TutorError::EmptyResponse {
                reason: format!("provider '{}' returned no text", self.label),
            });
        }

        Ok(ServiceResponse {
            text: response.content,
            input_tokens: Some(response.prompt_tokens as u64),
            output_tokens: Some(response.completion_tokens as u64),
        })
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Resolve the answer service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.service`): used as-is; this is how
///    tests inject fakes.
/// 2. **Named provider** (`config.provider_name`): `gemini`/`google` get the
///    native client, anything else goes through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    API key from the environment.
/// 3. **Default**: the native Gemini client.
pub fn resolve_service(config: &TutorConfig) -> Result<Arc<dyn AnswerService>, TutorError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    match config.provider_name.as_deref() {
        None | Some("gemini") | Some("google") => Ok(Arc::new(GeminiClient::new(config)?)),
        Some(name) => {
            let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
                TutorError::ProviderNotConfigured {
                    provider: name.to_string(),
                    hint: format!("{e}"),
                }
            })?;
            Ok(Arc::new(ProviderService::new(provider, name, config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(parts: Vec<ContentPart>) -> GenerateRequest {
        GenerateRequest {
            parts,
            system_instruction: Arc::from("Be a tutor."),
        }
    }

    #[test]
    fn provider_messages_put_instruction_first_and_carry_images() {
        let png = InlineData {
            data: "AAAA".into(),
            mime_type: "image/png".into(),
        };
        let req = request(vec![
            ContentPart::text("A cart rolls."),
            ContentPart::inline(png.clone()),
            ContentPart::text("Find its speed."),
        ]);

        let (text, images) = flatten_parts(&req.parts);
        assert_eq!(text, "A cart rolls.\n\nFind its speed.");
        assert_eq!(images, vec![&png]);

        let messages = ProviderService::build_messages(&req);
        assert_eq!(messages.len(), 2);
        let system = format!("{:?}", messages[0]);
        assert!(system.contains("System"), "got: {system}");
        assert!(system.contains("Be a tutor."), "got: {system}");
        let user = format!("{:?}", messages[1]);
        assert!(user.contains("Find its speed."), "got: {user}");
    }

    #[test]
    fn image_only_request_has_empty_text() {
        let req = request(vec![ContentPart::inline(InlineData {
            data: "AAAA".into(),
            mime_type: "image/webp".into(),
        })]);
        let (text, images) = flatten_parts(&req.parts);
        assert!(text.is_empty());
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn content_parts_serialise_to_wire_shape() {
        let parts = vec![
            ContentPart::text("hello"),
            ContentPart::inline(InlineData {
                data: "AAAA".into(),
                mime_type: "image/png".into(),
            }),
        ];
        let v = serde_json::to_value(&parts).unwrap();
        assert_eq!(
            v,
            json!([
                { "text": "hello" },
                { "inlineData": { "data": "AAAA", "mimeType": "image/png" } }
            ])
        );
    }

    #[test]
    fn body_carries_system_instruction() {
        let config = TutorConfig::default();
        let client = GeminiClient::new(&config).unwrap();
        let req = request(vec![ContentPart::text("q")]);
        let v = serde_json::to_value(client.body(&req)).unwrap();
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][0]["parts"][0]["text"], "q");
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "Be a tutor.");
        assert!(v.get("generationConfig").is_none());
    }

    #[test]
    fn body_includes_generation_config_when_set() {
        let config = TutorConfig::builder()
            .temperature(0.2)
            .max_tokens(2048)
            .build()
            .unwrap();
        let client = GeminiClient::new(&config).unwrap();
        let req = request(vec![ContentPart::text("q")]);
        let v = serde_json::to_value(client.body(&req)).unwrap();
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 2048);
        assert!(v["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn endpoint_includes_model() {
        let config = TutorConfig::builder()
            .base_url("http://localhost:1234")
            .model("gemini-test")
            .build()
            .unwrap();
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:1234/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn response_text_concatenates_parts_and_skips_thoughts() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "thinking…", "thought": true },
                    { "text": "## Solution\n" },
                    { "text": "$v = 3$" }
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 34 }
        });
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let r = parsed.into_service_response().unwrap();
        assert_eq!(r.text, "## Solution\n$v = 3$");
        assert_eq!(r.input_tokens, Some(12));
        assert_eq!(r.output_tokens, Some(34));
    }

    #[test]
    fn blocked_prompt_is_empty_response() {
        let raw = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let err = parsed.into_service_response().unwrap_err();
        assert!(err.to_string().contains("SAFETY"), "got: {err}");
    }

    #[test]
    fn candidate_without_text_reports_finish_reason() {
        let raw = json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] });
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let err = parsed.into_service_response().unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"), "got: {err}");
    }

    #[test]
    fn status_mapping() {
        let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        match map_status(StatusCode::FORBIDDEN, None, body) {
            TutorError::AuthError { detail, .. } => {
                assert!(detail.contains("API key not valid"));
                assert!(detail.contains("PERMISSION_DENIED"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, Some(7), ""),
            TutorError::RateLimitExceeded {
                retry_after_secs: Some(7),
                ..
            }
        ));

        let err = map_status(StatusCode::INTERNAL_SERVER_ERROR, None, "upstream exploded");
        assert!(err.to_string().contains("HTTP 500"));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_at_call_time() {
        let config = TutorConfig::builder()
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let client = GeminiClient::new(&config).expect("construction does not need a key");
        let err = client
            .generate(&request(vec![ContentPart::text("q")]))
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn resolve_prefers_injected_service() {
        struct Fixed;
        #[async_trait]
        impl AnswerService for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }
            async fn generate(&self, _r: &GenerateRequest) -> Result<ServiceResponse, TutorError> {
                Ok(ServiceResponse {
                    text: "42".into(),
                    input_tokens: None,
                    output_tokens: None,
                })
            }
        }

        let config = TutorConfig::builder()
            .provider_name("openai")
            .service(Arc::new(Fixed))
            .build()
            .unwrap();
        assert_eq!(resolve_service(&config).unwrap().name(), "fixed");
    }

    #[test]
    fn resolve_defaults_to_gemini() {
        let config = TutorConfig::default();
        assert_eq!(resolve_service(&config).unwrap().name(), "gemini");
    }
}
