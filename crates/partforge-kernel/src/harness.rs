//! Python harness generation and output classification.
//!
//! The kernel never interprets CAD geometry itself: it wraps the user
//! script in a small harness that runs CadQuery, resolves the `result`
//! binding, and prints exactly one JSON object on stdout. Everything the
//! adapter knows about the solid comes from that envelope.

use serde::Deserialize;

use crate::error::ExecutionError;
use partforge_core::geometry::BoundingBox;

/// Envelope printed by the harness.
#[derive(Debug, Deserialize)]
pub(crate) struct HarnessOutput {
    pub success: bool,
    #[serde(default)]
    pub bounding_box: Option<HarnessBoundingBox>,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HarnessBoundingBox {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<HarnessBoundingBox> for BoundingBox {
    fn from(bbox: HarnessBoundingBox) -> Self {
        BoundingBox::new(bbox.x, bbox.y, bbox.z)
    }
}

fn indent(script: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    script
        .lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wraps a user script into an execution harness that reports the solid's
/// bounding box at full precision.
pub(crate) fn execution_harness(script: &str) -> String {
    format!(
        r#"import json
import sys

try:
    import cadquery as cq
    import math

{user_code}

    if "result" not in dir():
        print(json.dumps({{"success": False, "error_kind": "empty_result",
                          "error": "script does not bind a 'result' solid"}}))
        sys.exit(0)

    # Resolve the bound output to a shape. Workplanes carry .val(),
    # library objects build lazily.
    shape = result
    if hasattr(shape, "build"):
        shape = shape.build()
    if hasattr(shape, "val"):
        shape = shape.val()
    elif hasattr(shape, "wrapped") and not hasattr(shape, "BoundingBox"):
        shape = shape.wrapped

    bbox = shape.BoundingBox()
    print(json.dumps({{
        "success": True,
        "bounding_box": {{"x": bbox.xlen, "y": bbox.ylen, "z": bbox.zlen}},
    }}))
except Exception as e:
    import traceback
    print(json.dumps({{
        "success": False,
        "error_kind": "exception",
        "error": str(e),
        "traceback": traceback.format_exc(),
    }}))
"#,
        user_code = indent(script, 4)
    )
}

/// Wraps a user script into a harness that exports the solid as STL.
pub(crate) fn export_harness(script: &str, stl_path: &str) -> String {
    format!(
        r#"import json

try:
    import cadquery as cq
    from cadquery import exporters
    import math

{user_code}

    export_shape = result
    if hasattr(export_shape, "build"):
        export_shape = export_shape.build()

    exporters.export(export_shape, {stl_path:?})
    print(json.dumps({{"success": True, "path": {stl_path:?}}}))
except Exception as e:
    import traceback
    print(json.dumps({{
        "success": False,
        "error_kind": "exception",
        "error": str(e),
        "traceback": traceback.format_exc(),
    }}))
"#,
        user_code = indent(script, 4)
    )
}

/// Maps a failed harness envelope (or raw stderr from a crashed
/// interpreter) to a classified execution error.
pub(crate) fn classify_failure(
    error_kind: Option<&str>,
    error: &str,
    traceback: Option<&str>,
) -> ExecutionError {
    if error_kind == Some("empty_result") {
        return ExecutionError::EmptyResult;
    }

    let combined = match traceback {
        Some(tb) => format!("{error}\n{tb}"),
        None => error.to_string(),
    };

    if combined.contains("SyntaxError") || combined.contains("IndentationError") {
        return ExecutionError::Syntax(error.to_string());
    }
    if combined.contains("name 'result' is not defined") {
        return ExecutionError::EmptyResult;
    }
    if combined.contains("ModuleNotFoundError") || combined.contains("No module named") {
        return ExecutionError::Internal(error.to_string());
    }

    ExecutionError::Geometry(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_embeds_indented_user_code() {
        let harness = execution_harness("length = 50\nresult = cq.Workplane(\"XY\").box(1, 1, 1)");
        assert!(harness.contains("    length = 50"));
        assert!(harness.contains("    result = cq.Workplane"));
        assert!(harness.contains("BoundingBox()"));
    }

    #[test]
    fn test_export_harness_embeds_path() {
        let harness = export_harness("result = cq.Workplane(\"XY\").box(1, 1, 1)", "/tmp/p.stl");
        assert!(harness.contains("\"/tmp/p.stl\""));
        assert!(harness.contains("exporters.export"));
    }

    #[test]
    fn test_classify_empty_result_kind() {
        let err = classify_failure(Some("empty_result"), "no binding", None);
        assert_eq!(err, ExecutionError::EmptyResult);
    }

    #[test]
    fn test_classify_syntax_from_traceback() {
        let err = classify_failure(
            Some("exception"),
            "invalid syntax (line 3)",
            Some("Traceback...\nSyntaxError: invalid syntax"),
        );
        assert!(matches!(err, ExecutionError::Syntax(_)));
    }

    #[test]
    fn test_classify_missing_result_name_error() {
        let err = classify_failure(
            Some("exception"),
            "name 'result' is not defined",
            Some("Traceback...\nNameError: name 'result' is not defined"),
        );
        assert_eq!(err, ExecutionError::EmptyResult);
    }

    #[test]
    fn test_classify_geometry_default() {
        let err = classify_failure(
            Some("exception"),
            "BRep_API: command not done",
            Some("Traceback...\nStdFail_NotDone: BRep_API: command not done"),
        );
        assert!(matches!(err, ExecutionError::Geometry(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_missing_interpreter_module_internal() {
        let err = classify_failure(
            Some("exception"),
            "No module named 'cadquery'",
            Some("ModuleNotFoundError: No module named 'cadquery'"),
        );
        assert!(matches!(err, ExecutionError::Internal(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_success_envelope() {
        let output: HarnessOutput = serde_json::from_str(
            r#"{"success": true, "bounding_box": {"x": 50.0, "y": 30.0, "z": 20.0}}"#,
        )
        .unwrap();
        assert!(output.success);
        let bbox: BoundingBox = output.bounding_box.unwrap().into();
        assert_eq!(bbox.x, 50.0);
    }
}
