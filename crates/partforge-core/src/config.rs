//! Application configuration.
//!
//! All generation, validation, and kernel settings are explicit values
//! threaded into the services that need them. There is no ambient global
//! configuration, so sessions remain independently configurable and
//! testable in isolation.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Language-model providers supported for script generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
}

impl Provider {
    /// The fast model for agent conversations (questions, analysis).
    pub fn fast_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-haiku-4-5-20251001",
            Provider::OpenAi => "gpt-5-nano",
        }
    }

    /// The most capable model, reserved for final code generation.
    pub fn best_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-opus-4-5-20251101",
            Provider::OpenAi => "gpt-5.2-pro",
        }
    }
}

/// Printer constraints used by the validator's manufacturability checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterSettings {
    /// Build volume extents in millimeters.
    pub build_volume_x: f64,
    pub build_volume_y: f64,
    pub build_volume_z: f64,
    /// Layer height in millimeters.
    pub layer_height: f64,
    /// Minimum printable wall thickness in millimeters.
    pub min_wall_thickness: f64,
    /// Nozzle diameter in millimeters.
    pub nozzle_diameter: f64,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            build_volume_x: 220.0,
            build_volume_y: 220.0,
            build_volume_z: 250.0,
            layer_height: 0.2,
            min_wall_thickness: 1.2,
            nozzle_diameter: 0.4,
        }
    }
}

/// Top-level configuration for the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Which language-model provider to use.
    #[serde(default)]
    pub provider: Provider,
    /// Optional model override; `None` selects the provider default.
    #[serde(default)]
    pub model: Option<String>,
    /// Maximum generate/validate attempts per generation request.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Hard wall-clock timeout for a single kernel execution, in seconds.
    #[serde(default = "default_kernel_timeout_secs")]
    pub kernel_timeout_secs: u64,
    /// Path to the interpreter used by the geometry kernel.
    #[serde(default = "default_python_path")]
    pub python_path: String,
    /// Directory for exported mesh artifacts.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    /// Printer constraints for manufacturability checks.
    #[serde(default)]
    pub printer: PrinterSettings,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_kernel_timeout_secs() -> u64 {
    30
}

fn default_python_path() -> String {
    "python".to_string()
}

fn default_export_dir() -> String {
    std::env::temp_dir()
        .join("partforge")
        .to_string_lossy()
        .into_owned()
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            max_attempts: default_max_attempts(),
            kernel_timeout_secs: default_kernel_timeout_secs(),
            python_path: default_python_path(),
            export_dir: default_export_dir(),
            printer: PrinterSettings::default(),
        }
    }
}

impl ForgeConfig {
    /// Parses a configuration from TOML text, filling defaults for
    /// missing fields.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The model used for reasoning-role conversations.
    pub fn conversation_model(&self) -> String {
        self.provider.fast_model().to_string()
    }

    /// The model used for final code generation. An explicit `model`
    /// override wins over the provider's best model.
    pub fn generation_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.best_model().to_string())
    }
}
