//! partforge-core: domain model and pure logic for the partforge pipeline.
//!
//! This crate holds everything the generation pipeline shares and nothing
//! that talks to the outside world: sessions and their transcript,
//! requirements, the parameter extractor/patcher, geometry facts, version
//! ledger types, configuration, and the shared error type. Kernel
//! execution, model providers, and the orchestration live in the crates
//! built on top of it.

pub mod attachment;
pub mod config;
pub mod error;
pub mod geometry;
pub mod params;
pub mod requirements;
pub mod session;
pub mod version;

// Re-export common error type
pub use error::{ForgeError, Result};
