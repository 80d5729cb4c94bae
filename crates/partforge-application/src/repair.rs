//! The generate-validate-repair loop.
//!
//! This is the only retrying component in the pipeline. Every attempt is
//! one generation plus at most one kernel execution; the loop never exceeds
//! its attempt budget and never discards a failure.

use tracing::{info, warn};

use crate::validator::{ValidationOutcome, Validator};
use partforge_core::geometry::BoundingBox;
use partforge_interaction::{GenerationRequest, ScriptGenerator};

/// One generation attempt, kept whether or not it succeeded.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// The generated script; `None` when generation itself failed.
    pub script: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub bounding_box: Option<BoundingBox>,
}

impl AttemptRecord {
    fn score(&self) -> (usize, usize) {
        (self.errors.len(), self.warnings.len())
    }
}

/// The loop's final verdict with the full attempt history.
#[derive(Debug, Clone)]
pub struct RepairReport {
    pub success: bool,
    /// The accepted script, or the best-scoring failed attempt's script.
    pub script: Option<String>,
    pub bounding_box: Option<BoundingBox>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub attempts: Vec<AttemptRecord>,
}

impl RepairReport {
    /// Attempts consumed, successful or not.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Runs generation attempts until the validator accepts a script or the
/// budget runs out.
pub struct RepairLoop {
    generator: ScriptGenerator,
    validator: Validator,
    max_attempts: u32,
}

impl RepairLoop {
    pub fn new(generator: ScriptGenerator, validator: Validator, max_attempts: u32) -> Self {
        Self {
            generator,
            validator,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs up to `max_attempts` generate/validate rounds. Each failed
    /// round seeds the next generation with its script and diagnostics, so
    /// the model sees the code it is fixing. On budget exhaustion the
    /// best-scoring failed attempt (fewest errors, then fewest warnings) is
    /// returned, tagged failed, with the full history.
    pub async fn run(&self, base: GenerationRequest) -> RepairReport {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut diagnostics: Vec<String> = base.diagnostics.clone();
        let mut failed_script: Option<String> = None;

        for attempt in 1..=self.max_attempts {
            let mut request = base.clone().with_diagnostics(diagnostics.clone());
            if let Some(previous) = &failed_script {
                request = request.with_failed_script(previous.clone());
            }

            let script = match self.generator.generate(&request).await {
                Ok(script) => script,
                Err(err) => {
                    // A capability failure consumes an attempt like any
                    // kernel failure.
                    warn!(attempt, error = %err, "generation attempt failed");
                    diagnostics = vec![err.to_string()];
                    attempts.push(AttemptRecord {
                        attempt,
                        script: None,
                        errors: vec![err.to_string()],
                        warnings: Vec::new(),
                        bounding_box: None,
                    });
                    continue;
                }
            };

            let outcome = self.validator.validate(&script).await;
            // Keep the text the validator actually checked, corrections
            // included, so the session stores what executed.
            let script = outcome.corrected_script.clone().unwrap_or(script);
            let record = AttemptRecord {
                attempt,
                script: Some(script.clone()),
                errors: outcome.errors.clone(),
                warnings: outcome.warnings.clone(),
                bounding_box: outcome.bounding_box,
            };
            attempts.push(record);

            if outcome.valid {
                info!(attempt, "script accepted");
                return Self::success(script, outcome, attempts);
            }

            info!(
                attempt,
                errors = outcome.errors.len(),
                remaining = self.max_attempts - attempt,
                "attempt rejected"
            );
            diagnostics = outcome.errors;
            failed_script = Some(script);
        }

        warn!(max_attempts = self.max_attempts, "attempt budget exhausted");
        Self::best_effort(attempts)
    }

    fn success(
        script: String,
        outcome: ValidationOutcome,
        attempts: Vec<AttemptRecord>,
    ) -> RepairReport {
        RepairReport {
            success: true,
            script: Some(script),
            bounding_box: outcome.bounding_box,
            errors: Vec::new(),
            warnings: outcome.warnings,
            attempts,
        }
    }

    /// Picks the least-bad failed attempt so the caller still gets a
    /// script to show alongside its outstanding diagnostics.
    fn best_effort(attempts: Vec<AttemptRecord>) -> RepairReport {
        let best = attempts
            .iter()
            .filter(|record| record.script.is_some())
            .min_by_key(|record| record.score())
            .or_else(|| attempts.last())
            .cloned();

        match best {
            Some(record) => RepairReport {
                success: false,
                script: record.script,
                bounding_box: record.bounding_box,
                errors: record.errors,
                warnings: record.warnings,
                attempts,
            },
            None => RepairReport {
                success: false,
                script: None,
                bounding_box: None,
                errors: vec!["No generation attempt was made".to_string()],
                warnings: Vec::new(),
                attempts,
            },
        }
    }
}
