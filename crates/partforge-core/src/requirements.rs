//! Structured design requirements gathered over the conversation.

use serde::{Deserialize, Serialize};

/// Dimension fields of a requirements record.
///
/// `specified` distinguishes "the user gave concrete numbers" from "the
/// user explicitly left dimensions open" (`unspecified` marker). One of
/// the two must hold before the session may leave the gathering phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Dimensions {
    /// True once the user provided at least one concrete dimension.
    #[serde(default)]
    pub specified: bool,
    /// True when the user explicitly declined to give dimensions.
    #[serde(default)]
    pub unspecified_marker: bool,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl Dimensions {
    pub fn has_concrete_dimension(&self) -> bool {
        self.length.is_some() || self.width.is_some() || self.height.is_some()
    }
}

/// A partially-filled requirements record.
///
/// Fields are filled incrementally by the requirements-gathering agent and
/// are never retroactively cleared: `merge` only overwrites a field when
/// the incoming update carries a value for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignRequirements {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub use_case: String,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default = "default_material")]
    pub material: String,
    pub wall_thickness: Option<f64>,
    /// Expected load in kilograms, when the part is load-bearing.
    pub expected_load: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub style: String,
    pub fillet_radius: Option<f64>,
}

fn default_material() -> String {
    "PLA".to_string()
}

impl Default for DesignRequirements {
    fn default() -> Self {
        Self {
            description: String::new(),
            use_case: String::new(),
            dimensions: Dimensions::default(),
            material: default_material(),
            wall_thickness: None,
            expected_load: None,
            features: Vec::new(),
            constraints: Vec::new(),
            style: String::new(),
            fillet_radius: None,
        }
    }
}

/// A partial update extracted from the latest user message. Absent fields
/// leave the existing record untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequirementsUpdate {
    pub description: Option<String>,
    pub use_case: Option<String>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Explicit "dimensions unspecified" marker from the user.
    pub dimensions_unspecified: Option<bool>,
    pub material: Option<String>,
    pub wall_thickness: Option<f64>,
    pub expected_load: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub style: Option<String>,
    pub fillet_radius: Option<f64>,
}

impl RequirementsUpdate {
    /// True when the update changes anything a generated script depends on:
    /// a dimension, the wall thickness or fillet radius, the style, or a
    /// feature or constraint not already in the record. Such an update
    /// invalidates any script generated from the old values.
    pub fn invalidates(&self, current: &DesignRequirements) -> bool {
        let dims = &current.dimensions;
        let changed = |new: Option<f64>, old: Option<f64>| match (new, old) {
            (Some(n), Some(o)) => (n - o).abs() > f64::EPSILON,
            (Some(_), None) => true,
            _ => false,
        };
        let new_entries = |incoming: &[String], existing: &[String]| {
            incoming.iter().any(|item| !existing.contains(item))
        };
        let style_changed = self
            .style
            .as_deref()
            .is_some_and(|style| !style.is_empty() && style != current.style);

        changed(self.length, dims.length)
            || changed(self.width, dims.width)
            || changed(self.height, dims.height)
            || changed(self.wall_thickness, current.wall_thickness)
            || changed(self.fillet_radius, current.fillet_radius)
            || new_entries(&self.features, &current.features)
            || new_entries(&self.constraints, &current.constraints)
            || style_changed
    }
}

impl DesignRequirements {
    /// Merges an update into the record. Filled fields are only ever
    /// overwritten by newer extractions, never cleared.
    pub fn merge(&mut self, update: RequirementsUpdate) {
        if let Some(description) = update.description {
            if !description.is_empty() {
                self.description = description;
            }
        }
        if let Some(use_case) = update.use_case {
            if !use_case.is_empty() {
                self.use_case = use_case;
            }
        }
        if update.length.is_some() {
            self.dimensions.length = update.length;
            self.dimensions.specified = true;
        }
        if update.width.is_some() {
            self.dimensions.width = update.width;
            self.dimensions.specified = true;
        }
        if update.height.is_some() {
            self.dimensions.height = update.height;
            self.dimensions.specified = true;
        }
        if let Some(marker) = update.dimensions_unspecified {
            self.dimensions.unspecified_marker = marker;
        }
        if let Some(material) = update.material {
            if !material.is_empty() {
                self.material = material;
            }
        }
        if update.wall_thickness.is_some() {
            self.wall_thickness = update.wall_thickness;
        }
        if update.expected_load.is_some() {
            self.expected_load = update.expected_load;
        }
        for feature in update.features {
            if !self.features.contains(&feature) {
                self.features.push(feature);
            }
        }
        for constraint in update.constraints {
            if !self.constraints.contains(&constraint) {
                self.constraints.push(constraint);
            }
        }
        if let Some(style) = update.style {
            if !style.is_empty() {
                self.style = style;
            }
        }
        if update.fillet_radius.is_some() {
            self.fillet_radius = update.fillet_radius;
        }
    }

    /// Whether the record is complete enough to leave the gathering phase:
    /// at least one concrete dimension or an explicit "unspecified" marker,
    /// plus a use case or a non-empty feature list. This gates whether the
    /// script generator may run.
    pub fn is_ready_for_design(&self) -> bool {
        let dims_settled =
            self.dimensions.has_concrete_dimension() || self.dimensions.unspecified_marker;
        let intent_known = !self.use_case.is_empty() || !self.features.is_empty();
        dims_settled && intent_known
    }

    /// Builds the design prompt fed to the script generator.
    pub fn to_design_prompt(&self) -> String {
        let mut parts = vec![format!("Create a 3D part: {}", self.description)];

        if !self.use_case.is_empty() {
            parts.push(format!("Use case: {}", self.use_case));
        }
        if self.dimensions.has_concrete_dimension() {
            let mut dims = Vec::new();
            if let Some(length) = self.dimensions.length {
                dims.push(format!("length={}mm", length));
            }
            if let Some(width) = self.dimensions.width {
                dims.push(format!("width={}mm", width));
            }
            if let Some(height) = self.dimensions.height {
                dims.push(format!("height={}mm", height));
            }
            parts.push(format!("Dimensions: {}", dims.join(", ")));
        }
        if let Some(wall) = self.wall_thickness {
            parts.push(format!("Wall thickness: {}mm", wall));
        }
        if !self.features.is_empty() {
            parts.push(format!("Features: {}", self.features.join(", ")));
        }
        if !self.constraints.is_empty() {
            parts.push(format!("Constraints: {}", self.constraints.join(", ")));
        }
        if !self.style.is_empty() {
            parts.push(format!("Style: {}", self.style));
        }
        if self.material != "PLA" {
            parts.push(format!("Material: {}", self.material));
        }
        if let Some(load) = self.expected_load {
            parts.push(format!("Expected load: {}kg", load));
        }
        if let Some(radius) = self.fillet_radius {
            parts.push(format!("Fillet radius: {}mm", radius));
        }

        parts.join("\n")
    }
}
