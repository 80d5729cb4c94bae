//! partforge-interaction: language-model capabilities and prompts.
//!
//! Defines the [`LanguageModel`] seam the pipeline generates through, the
//! Claude and OpenAI HTTP implementations behind it, and the prompt
//! library for generation and the agent panel.

pub mod capability;
pub mod claude;
pub mod generator;
pub mod openai;
pub mod prompts;

pub use capability::{CapabilityError, CompletionRequest, LanguageModel};
pub use claude::ClaudeModel;
pub use generator::{GenerationRequest, ScriptGenerator, extract_script};
pub use openai::OpenAiModel;
