//! The pluggable language-model capability.
//!
//! The pipeline never talks to a provider SDK directly: given a prompt
//! plus context, a [`LanguageModel`] returns text. Implementations are
//! stateless and safely shared across concurrent sessions.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use partforge_core::attachment::Attachment;

/// A single completion request: system specification, user prompt, and
/// optional visual references.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub images: Vec<Attachment>,
    /// Model identifier; providers fall back to their default when empty.
    pub model: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            images: Vec::new(),
            model: String::new(),
            max_tokens: 4096,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_images(mut self, images: Vec<Attachment>) -> Self {
        self.images = images;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Errors from the language-model capability.
#[derive(Error, Debug, Clone)]
pub enum CapabilityError {
    /// The request could not be built or executed.
    #[error("Capability execution failed: {0}")]
    ExecutionFailed(String),

    /// The provider returned an HTTP-level failure.
    #[error("Provider error ({status_code:?}): {message}")]
    Process {
        status_code: Option<u16>,
        message: String,
        is_retryable: bool,
        retry_after: Option<Duration>,
    },

    /// The provider responded but the payload was unparseable.
    #[error("Unparseable provider response: {0}")]
    Parse(String),
}

impl CapabilityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Process { is_retryable: true, .. })
    }
}

/// The natural-language model capability: given a prompt + context,
/// return text. Same input may yield different output across calls;
/// callers assert on validated properties, never on literal text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A short description of what this capability is good at.
    fn expertise(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError>;
}
