//! OpenAI-compatible chat-completions gateway.
//!
//! Exposes the three category tools (`math_code`, `vl_mode`, `light_mode`)
//! over a single `/chat/completions` endpoint and maps HTTP-level failures
//! onto [`ProtocolErrorKind`] so the invoker can decide what to retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::classifier::TaskCategory;
use crate::config::ApiConfig;
use crate::error::{ProtocolError, ProtocolErrorKind};
use crate::gateway::{ProtocolGateway, ToolDescriptor};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_BODY_PREVIEW: usize = 500;
/// Added to the caller's timeout so the invoker's deadline fires first.
const TRANSPORT_GRACE: Duration = Duration::from_secs(5);

/// Arguments object accepted by every category tool.
#[derive(Debug, Clone, Deserialize)]
struct CallArguments {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(default)]
    system_prompt: Option<String>,
    text: String,
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    /// Emitted by reasoning models (DeepSeek-R1 style).
    reasoning_content: Option<String>,
}

/// Gateway speaking the chat-completions wire format over HTTP.
#[derive(Debug, Clone)]
pub struct ChatCompletionsGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatCompletionsGateway {
    pub fn new(api: &ApiConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key: api.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET {base_url}/models` answers 2xx within five seconds.
    pub async fn check_endpoint(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let request = self.authorize(self.http.get(&url).timeout(HEALTH_CHECK_TIMEOUT));
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<String, ProtocolError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorize(
                self.http
                    .post(&url)
                    .json(request)
                    .timeout(timeout + TRANSPORT_GRACE),
            )
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(ProtocolError::new(
                classify_status(status),
                format!("HTTP {status}: {preview}"),
            ));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            ProtocolError::server_fault(format!("Failed to parse response: {e}"))
        })?;
        extract_content(parsed)
    }
}

#[async_trait]
impl ProtocolGateway for ChatCompletionsGateway {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProtocolError> {
        Ok(tool_descriptors())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<String, ProtocolError> {
        let category = TaskCategory::from_tool_name(name)
            .ok_or_else(|| ProtocolError::malformed(format!("unknown tool: {name}")))?;
        let args: CallArguments = serde_json::from_value(arguments)
            .map_err(|e| ProtocolError::malformed(format!("invalid arguments for {name}: {e}")))?;

        if category == TaskCategory::VisionLanguage && args.images.is_empty() {
            return Err(ProtocolError::malformed("vl_mode requires at least one image"));
        }

        let request = build_request(args);
        tracing::debug!(
            tool = name,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion"
        );
        self.complete(&request, timeout).await
    }
}

fn build_request(args: CallArguments) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = args.system_prompt.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage {
            role: "system",
            content: MessageContent::Text(system),
        });
    }

    let user_content = if args.images.is_empty() {
        MessageContent::Text(args.text)
    } else {
        let mut parts = Vec::with_capacity(args.images.len() + 1);
        parts.push(ContentPart::Text { text: args.text });
        parts.extend(args.images.into_iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url },
        }));
        MessageContent::Parts(parts)
    };
    messages.push(ChatMessage {
        role: "user",
        content: user_content,
    });

    ChatRequest {
        model: args.model,
        messages,
        max_tokens: args.max_tokens,
        temperature: args.temperature,
    }
}

/// First choice's text, with reasoning (when present) prepended in a
/// `<reasoning>` block.
fn extract_content(response: ChatResponse) -> Result<String, ProtocolError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProtocolError::server_fault("No response from model"))?;

    let ResponseMessage {
        content,
        reasoning_content,
    } = choice.message;
    let content = content.filter(|c| !c.trim().is_empty());
    let reasoning = reasoning_content.filter(|r| !r.trim().is_empty());

    match (reasoning, content) {
        (Some(reasoning), Some(answer)) => {
            Ok(format!("<reasoning>\n{reasoning}\n</reasoning>\n\n{answer}"))
        }
        (Some(reasoning), None) => Ok(reasoning),
        (None, Some(answer)) => Ok(answer),
        (None, None) => Err(ProtocolError::server_fault("Empty completion")),
    }
}

/// HTTP status → protocol error kind.
pub fn classify_status(status: StatusCode) -> ProtocolErrorKind {
    match status.as_u16() {
        401 | 403 => ProtocolErrorKind::Auth,
        408 | 429 => ProtocolErrorKind::RateLimit,
        400 | 404 | 405 | 413 | 415 | 422 => ProtocolErrorKind::Malformed,
        s if s >= 500 => ProtocolErrorKind::ServerFault,
        _ => ProtocolErrorKind::Malformed,
    }
}

fn map_transport_error(err: reqwest::Error) -> ProtocolError {
    if err.is_decode() {
        ProtocolError::server_fault(format!("Undecodable response body: {err}"))
    } else if err.is_builder() {
        ProtocolError::malformed(format!("Invalid request: {err}"))
    } else {
        ProtocolError::connectivity(format!("HTTP request failed: {err}"))
    }
}

/// Descriptors for the category tools this gateway serves.
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    TaskCategory::ALL
        .into_iter()
        .map(|category| {
            let (description, image_min) = match category {
                TaskCategory::MathCode => (
                    "Mathematical reasoning, proofs, algorithm analysis and code debugging",
                    0,
                ),
                TaskCategory::VisionLanguage => {
                    ("Questions about one or more attached images", 1)
                }
                TaskCategory::Light => (
                    "Lightweight text work: polishing, translation, summarization, extraction",
                    0,
                ),
            };
            ToolDescriptor {
                name: category.tool_name().to_string(),
                description: description.to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "model": { "type": "string" },
                        "max_tokens": { "type": "integer", "minimum": 1 },
                        "temperature": { "type": "number", "minimum": 0, "maximum": 2 },
                        "system_prompt": { "type": "string" },
                        "text": { "type": "string" },
                        "images": {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": image_min
                        }
                    },
                    "required": ["model", "max_tokens", "temperature", "text"]
                }),
            }
        })
        .collect()
}
