//! Version ledger types and persistence contract.
//!
//! Versions form an append-only ledger per part. Nothing is ever mutated
//! after creation; restoring an earlier version appends a new entry whose
//! script equals the old one.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::BoundingBox;
use crate::params::Parameter;

/// Lifecycle status of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Generated,
    Error,
}

/// What produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    Manual,
    Autosave,
    AiGenerate,
    ParameterUpdate,
    Restore,
    Initial,
}

/// One immutable entry of a part's version ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub part_id: String,
    pub script: String,
    /// Snapshot of the parameters extracted from `script` at save time.
    pub parameters: Vec<Parameter>,
    pub bounding_box: Option<BoundingBox>,
    pub status: VersionStatus,
    pub error_message: Option<String>,
    pub source: VersionSource,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

impl Version {
    pub fn new(
        part_id: impl Into<String>,
        script: impl Into<String>,
        parameters: Vec<Parameter>,
        bounding_box: Option<BoundingBox>,
        status: VersionStatus,
        error_message: Option<String>,
        source: VersionSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            part_id: part_id.into(),
            script: script.into(),
            parameters,
            bounding_box,
            status,
            error_message,
            source,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only persistence contract for version ledgers. Implementations
/// must never update an existing entry in place.
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Appends a version to the part's ledger.
    async fn save_version(&self, version: Version) -> Result<Version>;

    /// The most recently appended version for a part, if any.
    async fn load_latest(&self, part_id: &str) -> Result<Option<Version>>;

    /// The full ledger for a part, in append order.
    async fn load_versions(&self, part_id: &str) -> Result<Vec<Version>>;
}
