//! Script validation: static pre-checks, kernel execution, and
//! manufacturability warnings.
//!
//! Warnings never block; errors always do. Static checks catch the failure
//! modes that are cheaper to reject before a kernel round trip; everything
//! geometric comes from actually executing the script.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use partforge_core::config::PrinterSettings;
use partforge_core::geometry::BoundingBox;
use partforge_core::params;
use partforge_kernel::{ExecutionError, ScriptExecutor};

/// Method names models hallucinate onto the Workplane API.
const INVALID_METHODS: [&str; 13] = [
    "addSolid",
    "createBox",
    "makeBox",
    "createCylinder",
    "makeCyl",
    "addShape",
    "appendShape",
    "combineWith",
    "subtractFrom",
    "moveBy",
    "scaleBy",
    "rotateBy",
    "mirrorBy",
];

/// Mistakes common enough to rewrite in place instead of burning a repair
/// attempt: wrong boolean names, typoed operations, star imports.
static CORRECTIONS: Lazy<Vec<(Regex, &str)>> = Lazy::new(|| {
    [
        (r"\.add\(", ".union("),
        (r"\.subtract\(", ".cut("),
        (r"\.fillett\(", ".fillet("),
        (r"\.champher\(", ".chamfer("),
        (r"\.exturde\(", ".extrude("),
        (r"from cadquery import \*", "import cadquery as cq"),
        (r"import CadQuery", "import cadquery as cq"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

static RESULT_BINDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^result\s*=").unwrap());

static CYLINDER_Z_FILLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\.edges\("\|Z"\)\s*\.(?:fillet|chamfer)\("#).unwrap());

static FILLET_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(?:fillet|chamfer)\((\d+(?:\.\d+)?)\)").unwrap());

/// The result of validating one script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub bounding_box: Option<BoundingBox>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// The script after auto-corrections, when any applied. This is the
    /// text every check and the kernel actually saw; callers should keep
    /// it instead of the original.
    pub corrected_script: Option<String>,
}

impl ValidationOutcome {
    fn invalid(errors: Vec<String>, warnings: Vec<String>, corrected_script: Option<String>) -> Self {
        Self {
            valid: false,
            bounding_box: None,
            errors,
            warnings,
            corrected_script,
        }
    }
}

/// Validates scripts against the kernel and the printer constraints.
pub struct Validator {
    executor: Arc<dyn ScriptExecutor>,
    printer: PrinterSettings,
}

impl Validator {
    pub fn new(executor: Arc<dyn ScriptExecutor>, printer: PrinterSettings) -> Self {
        Self { executor, printer }
    }

    /// Validates a script: auto-corrections first, then static pre-checks,
    /// then a kernel execution, then manufacturability checks on the
    /// resulting solid. A script that fails the static checks is never
    /// executed. When corrections applied, the outcome carries the
    /// corrected text and one warning per rewrite.
    pub async fn validate(&self, script: &str) -> ValidationOutcome {
        let (script, mut warnings) = apply_corrections(script);
        let corrected_script = if warnings.is_empty() {
            None
        } else {
            Some(script.clone())
        };
        let script = script.as_str();

        let (static_errors, static_warnings) = static_checks(script);
        warnings.extend(static_warnings);
        let (parameters, duplicate_warnings) = params::extract_with_warnings(script);
        warnings.extend(duplicate_warnings);

        for parameter in &parameters {
            if parameter.value <= 0.0 {
                warnings.push(format!(
                    "Parameter '{}' is {} mm; non-positive dimensions rarely print",
                    parameter.name, parameter.value
                ));
            }
        }

        if !static_errors.is_empty() {
            debug!(errors = static_errors.len(), "static checks rejected script");
            return ValidationOutcome::invalid(static_errors, warnings, corrected_script);
        }

        let geometry = match self.executor.execute(script).await {
            Ok(geometry) => geometry,
            Err(err) => {
                let mut errors = vec![format!("{}: {}", err.classification(), err)];
                for hint in repair_hints(&err) {
                    errors.push(format!("Hint: {hint}"));
                }
                info!(classification = err.classification(), "kernel rejected script");
                return ValidationOutcome::invalid(errors, warnings, corrected_script);
            }
        };

        let bbox = geometry.bounding_box;
        warnings.extend(self.manufacturability_warnings(script, &parameters, &bbox));
        debug!(%bbox, warnings = warnings.len(), "script validated");

        ValidationOutcome {
            valid: true,
            bounding_box: Some(bbox),
            errors: Vec::new(),
            warnings,
            corrected_script,
        }
    }

    /// Post-execution checks against the printer constraints and the
    /// solid's actual extents. All of these are advisory.
    fn manufacturability_warnings(
        &self,
        script: &str,
        parameters: &[partforge_core::params::Parameter],
        bbox: &BoundingBox,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(overflow) = bbox.fits_within(&self.printer) {
            warnings.push(format!(
                "Part ({bbox}) exceeds the build volume by {overflow}"
            ));
        }

        for parameter in parameters {
            let name = parameter.name.to_lowercase();
            if name.contains("wall") || name.contains("thickness") {
                if parameter.value > 0.0 && parameter.value < self.printer.min_wall_thickness {
                    warnings.push(format!(
                        "Wall thickness '{}' = {} mm is below the printable minimum ({} mm)",
                        parameter.name, parameter.value, self.printer.min_wall_thickness
                    ));
                }
            }
        }

        if let Some(captures) = FILLET_LITERAL_RE.captures(script) {
            if let Ok(radius) = captures[1].parse::<f64>() {
                let limit = bbox.min_edge() / 2.0;
                if radius > limit {
                    warnings.push(format!(
                        "Fillet/chamfer radius {radius} mm exceeds half the smallest extent ({limit:.1} mm) and may fail"
                    ));
                }
            }
        }

        warnings
    }
}

/// Rewrites known-bad patterns in place and reports each rewrite as a
/// warning. Returns the (possibly unchanged) script text.
pub fn apply_corrections(script: &str) -> (String, Vec<String>) {
    let mut corrected = script.to_string();
    let mut warnings = Vec::new();

    for (pattern, replacement) in CORRECTIONS.iter() {
        if pattern.is_match(&corrected) {
            corrected = pattern.replace_all(&corrected, *replacement).into_owned();
            warnings.push(format!(
                "Auto-corrected: {} -> {}",
                pattern.as_str(),
                replacement
            ));
        }
    }

    (corrected, warnings)
}

/// Pre-execution checks on the script text. Returns `(errors, warnings)`.
pub fn static_checks(script: &str) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !script.contains("import cadquery") && !script.contains("from cadquery") {
        errors.push("Missing CadQuery import statement".to_string());
    }

    if !RESULT_BINDING_RE.is_match(script) {
        errors.push("Script does not bind a 'result' variable".to_string());
    }

    for method in INVALID_METHODS {
        if script.contains(&format!(".{method}(")) {
            errors.push(format!(
                "Invalid method '{method}' - this does not exist in CadQuery"
            ));
        }
    }

    if script.contains(".cylinder(") && CYLINDER_Z_FILLET_RE.is_match(script) {
        errors.push(
            "Cannot use .edges(\"|Z\") on cylinders - they have no vertical edges. \
             Use .edges(\">Z\") or .edges(\"<Z\") for top/bottom edges instead."
                .to_string(),
        );
    }

    let shell_pos = script.find(".shell(");
    let fillet_pos = script.rfind(".fillet(");
    if let (Some(shell), Some(fillet)) = (shell_pos, fillet_pos) {
        if fillet > shell {
            warnings.push(
                "fillet() applied after shell() - this often fails. \
                 Consider applying fillet before shell."
                    .to_string(),
            );
        }
    }

    if let Some(captures) = FILLET_LITERAL_RE.captures(script) {
        if let Ok(radius) = captures[1].parse::<f64>() {
            if radius > 10.0 {
                warnings.push(format!(
                    "Large fillet radius ({radius} mm) may cause errors - consider reducing"
                ));
            }
        }
    }

    if script.contains(".loft(") {
        warnings.push("loft() can be unreliable - ensure sections are compatible".to_string());
    }
    if script.contains(".sweep(") {
        warnings.push("sweep() can fail on complex paths - test carefully".to_string());
    }

    (errors, warnings)
}

/// Suggestions for fixing a classified kernel failure, fed back into the
/// repair prompt alongside the raw error.
pub fn repair_hints(error: &ExecutionError) -> Vec<String> {
    let message = error.to_string().to_lowercase();

    if message.contains("brep_api: command not done") {
        return vec![
            "Simplify the geometry - avoid complex loft/sweep operations".to_string(),
            "Build shapes separately and combine with .union()".to_string(),
            "Check that boolean operations (cut/union) involve intersecting shapes".to_string(),
            "Reduce fillet/chamfer radii".to_string(),
            "For organic shapes, use simple primitives (spheres, cylinders, boxes) combined"
                .to_string(),
        ];
    }

    if message.contains("no suitable edges") || message.contains("fillet") {
        return vec![
            "Check edge selector - .edges(\"|Z\") doesn't work on cylinders".to_string(),
            "Reduce fillet radius - must be smaller than wall thickness".to_string(),
            "Apply fillet BEFORE shell, not after".to_string(),
            "Try .edges(\">Z or <Z\") for top/bottom edges".to_string(),
            "Consider removing fillet entirely for reliability".to_string(),
        ];
    }

    if message.contains("shell") {
        return vec![
            "Reduce shell thickness - must be less than smallest dimension / 2".to_string(),
            "Select a face to remove: .faces(\">Z\").shell(-thickness)".to_string(),
            "Apply fillets BEFORE shell operation".to_string(),
            "Simplify the base shape first".to_string(),
        ];
    }

    match error {
        ExecutionError::Syntax(_) => vec![
            "Check parentheses matching".to_string(),
            "Verify method chaining syntax".to_string(),
            "Check for missing commas in function arguments".to_string(),
        ],
        ExecutionError::EmptyResult => vec![
            "Bind the final Workplane to a variable named 'result'".to_string(),
        ],
        ExecutionError::Timeout(_) => vec![
            "Simplify the geometry - the kernel could not finish in time".to_string(),
            "Reduce pattern counts and boolean operation chains".to_string(),
        ],
        _ => {
            if message.contains("has no attribute") || message.contains("attribute") {
                vec![
                    "Verify the method name exists in CadQuery".to_string(),
                    "Check CadQuery documentation for correct method".to_string(),
                    "Ensure you're calling methods on the right object type".to_string(),
                ]
            } else {
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use partforge_kernel::GeometryResult;

    struct FixedExecutor(Result<BoundingBox, ExecutionError>);

    #[async_trait]
    impl ScriptExecutor for FixedExecutor {
        async fn execute(&self, _script: &str) -> Result<GeometryResult, ExecutionError> {
            self.0
                .clone()
                .map(|bounding_box| GeometryResult { bounding_box })
        }
    }

    fn validator(result: Result<BoundingBox, ExecutionError>) -> Validator {
        Validator::new(Arc::new(FixedExecutor(result)), PrinterSettings::default())
    }

    const GOOD_SCRIPT: &str = "\
import cadquery as cq
length = 50
width = 30
height = 20
result = cq.Workplane(\"XY\").box(length, width, height)
";

    #[test]
    fn test_static_checks_missing_import_and_result() {
        let (errors, _) = static_checks("x = 1\n");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_static_checks_hallucinated_method() {
        let script = "import cadquery as cq\nresult = cq.Workplane().makeBox(1, 1, 1)\n";
        let (errors, _) = static_checks(script);
        assert!(errors.iter().any(|e| e.contains("makeBox")));
    }

    #[test]
    fn test_static_checks_cylinder_vertical_edges() {
        let script = "import cadquery as cq\nresult = cq.Workplane().cylinder(20, 10).edges(\"|Z\").fillet(2)\n";
        let (errors, _) = static_checks(script);
        assert!(errors.iter().any(|e| e.contains("|Z")));
    }

    #[test]
    fn test_static_checks_fillet_after_shell_warns() {
        let script = "import cadquery as cq\nresult = cq.Workplane().box(9, 9, 9).shell(-1).fillet(1)\n";
        let (errors, warnings) = static_checks(script);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.contains("after shell")));
    }

    #[tokio::test]
    async fn test_valid_script_yields_bbox() {
        let outcome = validator(Ok(BoundingBox::new(50.0, 30.0, 20.0)))
            .validate(GOOD_SCRIPT)
            .await;
        assert!(outcome.valid);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.bounding_box, Some(BoundingBox::new(50.0, 30.0, 20.0)));
    }

    #[tokio::test]
    async fn test_kernel_failure_carries_hints() {
        let outcome = validator(Err(ExecutionError::Geometry(
            "BRep_API: command not done".to_string(),
        )))
        .validate(GOOD_SCRIPT)
        .await;
        assert!(!outcome.valid);
        assert!(outcome.errors[0].starts_with("GeometryError"));
        assert!(outcome.errors.iter().any(|e| e.starts_with("Hint:")));
    }

    #[tokio::test]
    async fn test_zero_wall_is_warning_not_rejection() {
        let script = "\
import cadquery as cq
wall_thickness = 0
result = cq.Workplane(\"XY\").box(10, 10, 10)
";
        let outcome = validator(Ok(BoundingBox::new(10.0, 10.0, 10.0)))
            .validate(script)
            .await;
        assert!(outcome.valid);
        assert!(outcome.warnings.iter().any(|w| w.contains("wall_thickness")));
    }

    #[tokio::test]
    async fn test_build_volume_overflow_warns() {
        let outcome = validator(Ok(BoundingBox::new(400.0, 30.0, 20.0)))
            .validate(GOOD_SCRIPT)
            .await;
        assert!(outcome.valid);
        assert!(outcome.warnings.iter().any(|w| w.contains("build volume")));
    }

    #[test]
    fn test_static_checks_mirror_by_rejected() {
        let script = "import cadquery as cq\nresult = cq.Workplane().box(1, 1, 1).mirrorBy(\"XZ\")\n";
        let (errors, _) = static_checks(script);
        assert!(errors.iter().any(|e| e.contains("mirrorBy")));
    }

    #[tokio::test]
    async fn test_auto_correction_rewrites_boolean_names() {
        let script = "\
import cadquery as cq
length = 50
base = cq.Workplane(\"XY\").box(length, 30, 20)
result = base.add(cq.Workplane(\"XY\").box(10, 10, 10))
";
        let outcome = validator(Ok(BoundingBox::new(50.0, 30.0, 20.0)))
            .validate(script)
            .await;
        assert!(outcome.valid);
        let corrected = outcome.corrected_script.as_deref().unwrap();
        assert!(corrected.contains(".union("));
        assert!(!corrected.contains(".add("));
        assert!(outcome.warnings.iter().any(|w| w.starts_with("Auto-corrected:")));
    }

    #[tokio::test]
    async fn test_auto_correction_fixes_star_import() {
        let script = "\
from cadquery import *
result = cq.Workplane(\"XY\").box(10, 10, 10)
";
        let outcome = validator(Ok(BoundingBox::new(10.0, 10.0, 10.0)))
            .validate(script)
            .await;
        // The rewritten import satisfies the static import check
        assert!(outcome.valid);
        assert!(outcome
            .corrected_script
            .as_deref()
            .unwrap()
            .contains("import cadquery as cq"));
    }

    #[tokio::test]
    async fn test_clean_script_has_no_corrected_text() {
        let outcome = validator(Ok(BoundingBox::new(50.0, 30.0, 20.0)))
            .validate(GOOD_SCRIPT)
            .await;
        assert!(outcome.valid);
        assert!(outcome.corrected_script.is_none());
    }

    #[tokio::test]
    async fn test_static_errors_skip_execution() {
        // Executor would succeed, but the script never reaches it
        let outcome = validator(Ok(BoundingBox::new(1.0, 1.0, 1.0)))
            .validate("x = 1\n")
            .await;
        assert!(!outcome.valid);
        assert!(outcome.bounding_box.is_none());
    }
}
