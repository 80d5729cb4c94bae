//! OpenAiModel - Direct REST API implementation for OpenAI GPT.
//!
//! Calls the OpenAI Chat Completions API directly without CLI dependency.
//! The API key comes from the `OPENAI_API_KEY` environment variable or is
//! provided explicitly.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::HeaderValue};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::capability::{CapabilityError, CompletionRequest, LanguageModel};
use partforge_core::attachment::Attachment;

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Capability implementation that talks to the OpenAI HTTP API.
#[derive(Clone)]
pub struct OpenAiModel {
    client: Client,
    api_key: String,
    default_model: String,
}

impl OpenAiModel {
    /// Creates a new capability with the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            default_model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    /// The model name defaults to `gpt-4o` unless `OPENAI_MODEL_NAME` is set.
    pub fn try_from_env() -> Result<Self, CapabilityError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            CapabilityError::ExecutionFailed(
                "OPENAI_API_KEY not found in environment variables".into(),
            )
        })?;

        let default_model =
            env::var("OPENAI_MODEL_NAME").unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.into());
        Ok(Self::new(api_key).with_default_model(default_model))
    }

    /// Overrides the default model used when a request carries none.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    fn build_messages(request: &CompletionRequest) -> Result<Vec<ChatMessage>, CapabilityError> {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: vec![MessageContent::Text {
                    text: request.system.clone(),
                }],
            });
        }

        let mut content_parts = Vec::new();
        if !request.prompt.trim().is_empty() {
            content_parts.push(MessageContent::Text {
                text: request.prompt.clone(),
            });
        }
        for attachment in &request.images {
            content_parts.push(attachment_to_content(attachment));
        }

        if content_parts.is_empty() {
            return Err(CapabilityError::ExecutionFailed(
                "OpenAI request must include text or attachments".into(),
            ));
        }

        messages.push(ChatMessage {
            role: "user".to_string(),
            content: content_parts,
        });

        Ok(messages)
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> Result<String, CapabilityError> {
        let response = self
            .client
            .post(BASE_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| CapabilityError::Process {
                status_code: None,
                message: format!("OpenAI API request failed: {err}"),
                is_retryable: err.is_connect() || err.is_timeout(),
                retry_after: None,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read OpenAI error body".to_string());
            return Err(map_http_error(status, body_text, retry_after));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| CapabilityError::Parse(format!("OpenAI response: {err}")))?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn expertise(&self) -> &str {
        "OpenAI GPT capability for general-purpose reasoning and coding tasks"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError> {
        let messages = Self::build_messages(&request)?;

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let body = ChatCompletionRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
        };

        self.send_request(&body).await
    }
}

fn attachment_to_content(attachment: &Attachment) -> MessageContent {
    // OpenAI expects data URLs for base64 images
    let data_url = format!("data:{};base64,{}", attachment.mime_type, attachment.data);
    MessageContent::ImageUrl {
        image_url: ImageUrl { url: data_url },
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<MessageContent>,
}

enum MessageContent {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

// Custom serialization for MessageContent
impl Serialize for MessageContent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;

        match self {
            MessageContent::Text { text } => {
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", text)?;
            }
            MessageContent::ImageUrl { image_url } => {
                map.serialize_entry("type", "image_url")?;
                map.serialize_entry("image_url", image_url)?;
            }
        }

        map.end()
    }
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[allow(dead_code)]
    r#type: Option<String>,
    #[allow(dead_code)]
    code: Option<String>,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String, CapabilityError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            CapabilityError::Parse("OpenAI API returned no content in the response".into())
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
    fn test_image_attachment_becomes_data_url() {
        let attachment = Attachment::new(
            partforge_core::attachment::AttachmentKind::Image,
            "aWc=",
            "image/png",
            "ref",
        )
        .unwrap();
        let content = attachment_to_content(&attachment);
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "image_url");
        assert_eq!(json["image_url"]["url"], "data:image/png;base64,aWc=");
    }

    #[test]
    fn test_system_prompt_becomes_system_message() {
        let request = CompletionRequest::new("be terse", "make a box");
        let messages = OpenAiModel::build_messages(&request).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }
}
