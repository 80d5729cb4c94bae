//! Geometry kernel adapter: sandboxed, time-boxed script execution.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::harness::{self, HarnessOutput};
use partforge_core::config::ForgeConfig;
use partforge_core::geometry::BoundingBox;
use serde::{Deserialize, Serialize};

/// Geometry facts produced by a successful execution.
///
/// The solid itself lives and dies with the sandboxed interpreter; callers
/// get its derived facts here and a mesh artifact through
/// [`KernelAdapter::export_stl`]. Extents are computed by the kernel from
/// the solid's geometry, never from source-code heuristics, and are kept
/// at full precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryResult {
    pub bounding_box: BoundingBox,
}

/// The execution contract the validator and the repair loop depend on.
/// Tests substitute stub executors for deterministic pipelines.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Executes a parametric script in a fresh, isolated context.
    async fn execute(&self, script: &str) -> Result<GeometryResult, ExecutionError>;
}

/// Runs parametric scripts in a fresh interpreter subprocess per call.
///
/// Each call gets its own scratch file and process: no shared mutable
/// state across calls, no filesystem or network side effects beyond the
/// scratch file, and a hard wall-clock timeout after which the process is
/// killed and the call yields [`ExecutionError::Timeout`]. Execution
/// contexts are never reused or pooled across scripts.
#[derive(Debug, Clone)]
pub struct KernelAdapter {
    python_path: String,
    timeout: Duration,
    export_dir: PathBuf,
}

impl KernelAdapter {
    pub fn new(config: &ForgeConfig) -> Self {
        Self {
            python_path: config.python_path.clone(),
            timeout: Duration::from_secs(config.kernel_timeout_secs),
            export_dir: PathBuf::from(&config.export_dir),
        }
    }

    /// Overrides the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exports the solid bound by `script` as an STL mesh, returning the
    /// artifact path. Mesh formatting is entirely the kernel's own
    /// exporter; the adapter only drives it.
    pub async fn export_stl(
        &self,
        script: &str,
        part_id: &str,
    ) -> Result<PathBuf, ExecutionError> {
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|err| ExecutionError::Internal(format!("export dir: {err}")))?;

        let stl_path = self.export_dir.join(format!("{part_id}.stl"));
        let harness = harness::export_harness(script, &stl_path.to_string_lossy());
        let output = self.run_harness(&harness).await?;

        match output.path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Err(ExecutionError::Internal(
                "export harness reported no output path".to_string(),
            )),
        }
    }

    async fn run_harness(&self, harness_source: &str) -> Result<HarnessOutput, ExecutionError> {
        let scratch = tempfile::Builder::new()
            .prefix("partforge-")
            .suffix(".py")
            .tempfile()
            .map_err(|err| ExecutionError::Internal(format!("scratch file: {err}")))?;
        tokio::fs::write(scratch.path(), harness_source)
            .await
            .map_err(|err| ExecutionError::Internal(format!("scratch write: {err}")))?;

        let child = Command::new(&self.python_path)
            .arg(scratch.path())
            .kill_on_drop(true)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|err| ExecutionError::Internal(format!("spawn kernel: {err}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|err| ExecutionError::Internal(format!("kernel wait: {err}")))?
            }
            Err(_) => {
                // kill_on_drop reaps the runaway interpreter
                warn!(timeout_secs = self.timeout.as_secs(), "kernel execution timed out");
                return Err(ExecutionError::Timeout(self.timeout.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() && stdout.trim().is_empty() {
            // The harness never got to print its envelope: a compile-time
            // failure of the combined file, typically a syntax error in
            // the user script.
            debug!(%stderr, "kernel process failed before printing envelope");
            return Err(harness::classify_failure(None, stderr.trim(), None));
        }

        serde_json::from_str::<HarnessOutput>(stdout.trim()).map_err(|err| {
            ExecutionError::Internal(format!(
                "unparseable harness output: {err}: {}",
                stdout.trim()
            ))
        })
    }
}

#[async_trait]
impl ScriptExecutor for KernelAdapter {
    async fn execute(&self, script: &str) -> Result<GeometryResult, ExecutionError> {
        let harness = harness::execution_harness(script);
        let output = self.run_harness(&harness).await?;

        if output.success {
            let bounding_box = output
                .bounding_box
                .ok_or_else(|| {
                    ExecutionError::Internal("success envelope without bounding box".to_string())
                })?
                .into();
            debug!(%bounding_box, "kernel execution succeeded");
            return Ok(GeometryResult { bounding_box });
        }

        Err(harness::classify_failure(
            output.error_kind.as_deref(),
            output.error.as_deref().unwrap_or("unknown kernel error"),
            output.traceback.as_deref(),
        ))
    }
}
