//! Script generation from natural-language design briefs.
//!
//! The generator turns a brief (plus optional visual references, an
//! existing script, sibling parts and repair diagnostics) into a single
//! completion request and extracts the script from the model's reply.
//! Validation is the caller's job; the generator only promises text that
//! looks like a script.

use std::sync::Arc;

use tracing::{debug, info};

use crate::capability::{CompletionRequest, LanguageModel};
use crate::prompts;
use partforge_core::attachment::Attachment;
use partforge_core::config::ForgeConfig;
use partforge_core::{ForgeError, Result};

const GENERATION_MAX_TOKENS: u32 = 8192;

/// Everything one generation attempt needs. Diagnostics are non-empty only
/// on repair attempts; they carry the previous attempt's failures verbatim.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub description: String,
    pub attachments: Vec<Attachment>,
    pub existing_script: Option<String>,
    /// `(part name, script)` pairs from the same project.
    pub sibling_context: Vec<(String, String)>,
    /// The previous attempt's script, on repair attempts. The model must
    /// see the code it is fixing, not just the diagnostics.
    pub failed_script: Option<String>,
    pub diagnostics: Vec<String>,
}

impl GenerationRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_existing_script(mut self, script: impl Into<String>) -> Self {
        self.existing_script = Some(script.into());
        self
    }

    pub fn with_sibling_context(mut self, siblings: Vec<(String, String)>) -> Self {
        self.sibling_context = siblings;
        self
    }

    pub fn with_failed_script(mut self, script: impl Into<String>) -> Self {
        self.failed_script = Some(script.into());
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Produces parametric scripts through a [`LanguageModel`].
pub struct ScriptGenerator {
    model: Arc<dyn LanguageModel>,
    model_id: String,
}

impl ScriptGenerator {
    /// Creates a generator using the configured generation-tier model.
    pub fn new(model: Arc<dyn LanguageModel>, config: &ForgeConfig) -> Self {
        Self {
            model,
            model_id: config.generation_model(),
        }
    }

    /// Runs one generation attempt and returns the extracted script.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Generation`] when the provider call fails or
    /// the reply contains nothing that could be a script.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let system = prompts::select_system_prompt(
            request.existing_script.is_some(),
            !request.sibling_context.is_empty(),
        );
        let prompt = prompts::build_generation_prompt(
            &request.description,
            request.attachments.len(),
            request.existing_script.as_deref(),
            &request.sibling_context,
            request.failed_script.as_deref(),
            &request.diagnostics,
        );

        info!(
            model = %self.model_id,
            images = request.attachments.len(),
            repair = !request.diagnostics.is_empty(),
            "generating script"
        );

        let completion = CompletionRequest::new(system, prompt)
            .with_model(&self.model_id)
            .with_images(request.attachments.clone())
            .with_max_tokens(GENERATION_MAX_TOKENS);

        let reply = self
            .model
            .complete(completion)
            .await
            .map_err(|err| ForgeError::generation(err.to_string()))?;

        let script = extract_script(&reply);
        if script.is_empty() {
            return Err(ForgeError::generation("model returned an empty reply"));
        }
        debug!(bytes = script.len(), "script extracted");
        Ok(script)
    }
}

/// Extracts the script from a model reply. Prefers a `python` fence, falls
/// back to any fence (skipping a short language tag on the opening line),
/// and finally returns the trimmed reply itself.
pub fn extract_script(content: &str) -> String {
    if let Some(start) = content.find("```python") {
        let start = start + "```python".len();
        if let Some(end) = content[start..].find("```") {
            return content[start..start + end].trim().to_string();
        }
    }

    if let Some(start) = content.find("```") {
        let mut start = start + 3;
        if let Some(newline) = content[start..].find('\n') {
            // Skip a language identifier if present
            if newline < 20 {
                start += newline + 1;
            }
        }
        if let Some(end) = content[start..].find("```") {
            return content[start..start + end].trim().to_string();
        }
    }

    content.trim().to_string()
}
