//! partforge-kernel: the geometry kernel adapter.
//!
//! Executes parametric CadQuery scripts in isolated, time-boxed
//! interpreter subprocesses, classifies failures, and drives the kernel's
//! own STL exporter. The [`ScriptExecutor`] trait is the seam the rest of
//! the pipeline (and its tests) depend on.

mod adapter;
mod error;
mod harness;

pub use adapter::{GeometryResult, KernelAdapter, ScriptExecutor};
pub use error::ExecutionError;
