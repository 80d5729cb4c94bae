//! ClaudeModel - Direct REST API implementation for Claude.
//!
//! Calls the Anthropic messages API directly without SDK or CLI
//! dependency. The API key comes from the `ANTHROPIC_API_KEY` environment
//! variable or is provided explicitly.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::HeaderValue};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::capability::{CapabilityError, CompletionRequest, LanguageModel};
use partforge_core::attachment::Attachment;

const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-5-20250929";
const BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Capability implementation that talks to the Claude HTTP API.
#[derive(Clone)]
pub struct ClaudeModel {
    client: Client,
    api_key: String,
    default_model: String,
}

impl ClaudeModel {
    /// Creates a new capability with the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            default_model: DEFAULT_CLAUDE_MODEL.to_string(),
        }
    }

    /// Loads the API key from the `ANTHROPIC_API_KEY` environment variable.
    pub fn try_from_env() -> Result<Self, CapabilityError> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| {
            CapabilityError::ExecutionFailed(
                "ANTHROPIC_API_KEY not found in environment variables".into(),
            )
        })?;
        Ok(Self::new(api_key))
    }

    /// Overrides the default model used when a request carries none.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    fn build_content(request: &CompletionRequest) -> Result<Vec<ContentBlock>, CapabilityError> {
        let mut content_blocks = Vec::new();

        // Images first, then text, per API guidance
        for attachment in &request.images {
            content_blocks.push(attachment_to_content_block(attachment));
        }

        if !request.prompt.trim().is_empty() {
            content_blocks.push(ContentBlock::Text {
                text: request.prompt.clone(),
            });
        }

        if content_blocks.is_empty() {
            return Err(CapabilityError::ExecutionFailed(
                "Claude request must include text or attachments".into(),
            ));
        }

        Ok(content_blocks)
    }

    async fn send_request(&self, body: &CreateMessageRequest) -> Result<String, CapabilityError> {
        let response = self
            .client
            .post(BASE_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| CapabilityError::Process {
                status_code: None,
                message: format!("Claude API request failed: {err}"),
                is_retryable: err.is_connect() || err.is_timeout(),
                retry_after: None,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Claude error body".to_string());
            return Err(map_http_error(status, body_text, retry_after));
        }

        let parsed: CreateMessageResponse = response
            .json()
            .await
            .map_err(|err| CapabilityError::Parse(format!("Claude response: {err}")))?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl LanguageModel for ClaudeModel {
    fn expertise(&self) -> &str {
        "Claude API capability for reasoning and code generation"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError> {
        let content = Self::build_content(&request)?;

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let body = CreateMessageRequest {
            model,
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content,
            }],
            max_tokens: request.max_tokens,
            system: (!request.system.is_empty()).then(|| request.system.clone()),
        };

        self.send_request(&body).await
    }
}

fn attachment_to_content_block(attachment: &Attachment) -> ContentBlock {
    ContentBlock::Image {
        source: ImageSource {
            r#type: "base64".to_string(),
            media_type: attachment.mime_type.clone(),
            data: attachment.data.clone(),
        },
    }
}

#[derive(Serialize)]
struct CreateMessageRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ImageSource {
    r#type: String,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlockResponse>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlockResponse {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    r#type: String,
    message: String,
}

fn extract_text_response(response: CreateMessageResponse) -> Result<String, CapabilityError> {
    response
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlockResponse::Text { text } => Some(text),
        })
        .ok_or_else(|| {
            CapabilityError::Parse("Claude API returned no text in the response content".into())
        })
}

fn map_http_error(
    status: StatusCode,
    body: String,
    retry_after: Option<Duration>,
) -> CapabilityError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.clone());

    let is_retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );

    CapabilityError::Process {
        status_code: Some(status.as_u16()),
        message,
        is_retryable,
        retry_after,
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // Retry-After HTTP-date parsing is omitted for simplicity
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_shape() {
        let body = CreateMessageRequest {
            model: "claude-sonnet-4-5-20250929".to_string(),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: vec![ContentBlock::Text {
                    text: "hello".to_string(),
                }],
            }],
            max_tokens: 64,
            system: Some("be brief".to_string()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["system"], "be brief");
    }

    #[test]
    fn test_http_error_retryability() {
        let err = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"type": "rate_limit_error", "message": "slow down"}}"#.to_string(),
            Some(Duration::from_secs(5)),
        );
        assert!(err.is_retryable());
        assert!(err.to_string().contains("slow down"));

        let err = map_http_error(StatusCode::BAD_REQUEST, "bad".to_string(), None);
        assert!(!err.is_retryable());
    }
}
