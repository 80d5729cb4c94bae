//! Classified kernel execution errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What went wrong while executing a parametric script.
///
/// The repair loop treats `Timeout` exactly like `Geometry`: both are
/// retryable with diagnostics-seeded regeneration. `Internal` covers
/// harness or process failures outside the script's control.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionError {
    /// The script failed to parse.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// The kernel rejected a geometric operation (self-intersection,
    /// degenerate fillet radius, failed boolean, ...).
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// The script ran but bound no named output geometry.
    #[error("Script does not bind a 'result' solid")]
    EmptyResult,

    /// The hard wall-clock execution budget was exceeded.
    #[error("Execution timed out after {0} seconds")]
    Timeout(u64),

    /// The execution harness itself failed (interpreter missing, scratch
    /// file IO, unparseable harness output).
    #[error("Kernel internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Whether diagnostics-seeded regeneration can plausibly fix this.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Short classification label used in diagnostics and prompts.
    pub fn classification(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "SyntaxError",
            Self::Geometry(_) => "GeometryError",
            Self::EmptyResult => "EmptyResult",
            Self::Timeout(_) => "Timeout",
            Self::Internal(_) => "InternalError",
        }
    }
}
