//! Design-parameter extraction and patching.
//!
//! Parameters are derived, never authoritative: they are re-extracted from
//! the current script on every change, and the patcher rewrites value
//! tokens in place so that every other byte of the script survives
//! untouched. `extract(patch(s, {}))` is guaranteed to equal `extract(s)`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A candidate design parameter scanned from the top of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    /// Unit of measure; scripts are millimeter-based.
    pub unit: String,
    /// 1-based source line of the assignment.
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Errors from the parameter patcher.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatchError {
    /// The requested name has no matching top-level assignment. Callers
    /// must not invent new assignment lines.
    #[error("Parameter not found: '{0}'")]
    ParameterNotFound(String),
}

// Matches `name = 42` / `name = -2.5` at the top lexical level, with an
// optional trailing comment.
static ASSIGNMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(-?\d+(?:\.\d+)?)\s*(?:#.*)?$").unwrap()
});

static VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*[A-Za-z_][A-Za-z0-9_]*\s*=\s*)-?\d+(?:\.\d+)?").unwrap());

/// Classifies a source line during the top-of-script scan.
enum ScanLine<'a> {
    Skip,
    Assignment(regex::Captures<'a>),
    Stop,
}

fn scan_line(line: &str) -> ScanLine<'_> {
    let trimmed = line.trim_end();
    if trimmed.trim().is_empty() {
        return ScanLine::Skip;
    }
    let stripped = trimmed.trim_start();
    if stripped.starts_with('#') {
        return ScanLine::Skip;
    }
    if stripped.starts_with("import ") || stripped.starts_with("from ") {
        return ScanLine::Skip;
    }
    // Indented code means a block started above; the parameter block is over.
    if trimmed.starts_with(' ') || trimmed.starts_with('\t') {
        return ScanLine::Stop;
    }
    match ASSIGNMENT_RE.captures(trimmed) {
        Some(captures) => ScanLine::Assignment(captures),
        None => ScanLine::Stop,
    }
}

/// Extracts candidate design parameters: `identifier = numeric-literal`
/// assignments at the top lexical level, before the first
/// geometry-construction statement.
///
/// Duplicate names are resolved last-occurrence-wins; use
/// [`extract_with_warnings`] when the caller needs to surface shadowed
/// assignments.
pub fn extract(script: &str) -> Vec<Parameter> {
    extract_with_warnings(script).0
}

/// Like [`extract`], additionally reporting a warning for every duplicate
/// top-level assignment to the same name. Nothing is silently overridden:
/// the last occurrence wins and the shadowing is reported.
pub fn extract_with_warnings(script: &str) -> (Vec<Parameter>, Vec<String>) {
    let mut parameters: Vec<Parameter> = Vec::new();
    let mut warnings = Vec::new();

    for (index, line) in script.lines().enumerate() {
        match scan_line(line) {
            ScanLine::Skip => continue,
            ScanLine::Stop => break,
            ScanLine::Assignment(captures) => {
                let name = captures.get(1).unwrap().as_str();
                let value: f64 = captures.get(2).unwrap().as_str().parse().unwrap_or(0.0);
                let line_no = index + 1;

                if let Some(existing) = parameters.iter_mut().find(|p| p.name == name) {
                    warnings.push(format!(
                        "Duplicate assignment to '{}' at line {} shadows line {}; the last value wins",
                        name, line_no, existing.line
                    ));
                    existing.value = value;
                    existing.line = line_no;
                } else {
                    parameters.push(Parameter {
                        name: name.to_string(),
                        value,
                        unit: "mm".to_string(),
                        line: line_no,
                        min: None,
                        max: None,
                    });
                }
            }
        }
    }

    (parameters, warnings)
}

/// Rewrites the right-hand side of matching top-level assignment lines,
/// preserving every other byte of the script. Returns a new string; the
/// input is never mutated, so version snapshots stay trustworthy.
///
/// Every top-level assignment line for a requested name is rewritten (a
/// duplicated name keeps both occurrences consistent with the extracted
/// last-wins value).
pub fn patch(script: &str, updates: &BTreeMap<String, f64>) -> Result<String, PatchError> {
    if updates.is_empty() {
        return Ok(script.to_string());
    }

    let known: Vec<String> = extract(script).into_iter().map(|p| p.name).collect();
    for name in updates.keys() {
        if !known.iter().any(|k| k == name) {
            return Err(PatchError::ParameterNotFound(name.clone()));
        }
    }

    let mut lines: Vec<String> = script.split('\n').map(|l| l.to_string()).collect();

    for (index, original) in script.lines().enumerate() {
        match scan_line(original) {
            ScanLine::Skip => continue,
            ScanLine::Stop => break,
            ScanLine::Assignment(captures) => {
                let name = captures.get(1).unwrap().as_str();
                if let Some(value) = updates.get(name) {
                    lines[index] = VALUE_RE
                        .replace(&lines[index], |caps: &regex::Captures| {
                            format!("{}{}", &caps[1], format_value(*value))
                        })
                        .into_owned();
                }
            }
        }
    }

    Ok(lines.join("\n"))
}

/// Validates parameter values before they are injected into a script.
/// Rejects non-positive, sub-precision, and implausibly large dimensions.
pub fn validate_values(updates: &BTreeMap<String, f64>) -> Result<(), String> {
    for (name, value) in updates {
        if *value <= 0.0 {
            return Err(format!(
                "Parameter '{}' must be greater than 0 (current value: {})",
                name, value
            ));
        }
        if *value < 0.01 {
            return Err(format!(
                "Parameter '{}' is too small (minimum 0.01mm)",
                name
            ));
        }
        if *value > 10_000.0 {
            return Err(format!(
                "Parameter '{}' is too large (maximum 10000mm)",
                name
            ));
        }
    }
    Ok(())
}

/// Formats a value the way scripts write literals: whole numbers without a
/// trailing fraction.
fn format_value(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\
import cadquery as cq

# box dimensions
length = 50
width = 30.5
height = 20  # mm

result = cq.Workplane(\"XY\").box(length, width, height)
";

    #[test]
    fn test_extract_top_level_assignments() {
        let params = extract(SCRIPT);
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["length", "width", "height"]);
        assert_eq!(params[0].value, 50.0);
        assert_eq!(params[1].value, 30.5);
        assert_eq!(params[0].line, 4);
        assert_eq!(params[0].unit, "mm");
    }

    #[test]
    fn test_extract_stops_at_first_construction_statement() {
        let script = "\
length = 50
result = cq.Workplane(\"XY\").box(length, 10, 10)
late = 99
";
        let params = extract(script);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "length");
    }

    #[test]
    fn test_extract_ignores_nested_assignments() {
        let script = "\
size = 10
def helper():
    inner = 5
    return inner
result = helper()
";
        let params = extract(script);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "size");
    }

    #[test]
    fn test_extract_duplicate_warns_last_wins() {
        let script = "\
width = 10
width = 25
result = cq.Workplane(\"XY\").box(width, width, width)
";
        let (params, warnings) = extract_with_warnings(script);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].value, 25.0);
        assert_eq!(params[0].line, 2);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("width"));
    }

    #[test]
    fn test_patch_empty_updates_is_noop() {
        let patched = patch(SCRIPT, &BTreeMap::new()).unwrap();
        assert_eq!(patched, SCRIPT);
        assert_eq!(extract(&patched), extract(SCRIPT));
    }

    #[test]
    fn test_patch_changes_only_target_lines() {
        let mut updates = BTreeMap::new();
        updates.insert("width".to_string(), 42.0);
        let patched = patch(SCRIPT, &updates).unwrap();

        for (before, after) in SCRIPT.lines().zip(patched.lines()) {
            if before.starts_with("width") {
                assert_eq!(after, "width = 42");
            } else {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_patch_preserves_trailing_comment() {
        let mut updates = BTreeMap::new();
        updates.insert("height".to_string(), 25.5);
        let patched = patch(SCRIPT, &updates).unwrap();
        assert!(patched.contains("height = 25.5  # mm"));
    }

    #[test]
    fn test_patch_unknown_name_fails() {
        let mut updates = BTreeMap::new();
        updates.insert("missing".to_string(), 1.0);
        let err = patch(SCRIPT, &updates).unwrap_err();
        assert_eq!(err, PatchError::ParameterNotFound("missing".to_string()));
    }

    #[test]
    fn test_patch_round_trip_with_extract() {
        let mut updates = BTreeMap::new();
        updates.insert("length".to_string(), 75.0);
        let patched = patch(SCRIPT, &updates).unwrap();
        let params = extract(&patched);
        assert_eq!(params[0].value, 75.0);
        // Other parameters untouched
        assert_eq!(params[1].value, 30.5);
        assert_eq!(params[2].value, 20.0);
    }

    #[test]
    fn test_validate_values_bounds() {
        let mut updates = BTreeMap::new();
        updates.insert("w".to_string(), 0.0);
        assert!(validate_values(&updates).is_err());

        updates.insert("w".to_string(), 0.001);
        assert!(validate_values(&updates).is_err());

        updates.insert("w".to_string(), 20_000.0);
        assert!(validate_values(&updates).is_err());

        updates.insert("w".to_string(), 25.0);
        assert!(validate_values(&updates).is_ok());
    }
}
