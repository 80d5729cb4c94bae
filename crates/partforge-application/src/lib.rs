//! partforge-application: the generation-validation-repair pipeline.
//!
//! Wires the language-model capability and the geometry kernel into the
//! validator, the repair loop, the agent panel, and the conversation
//! session service that fronts them all.

pub mod conversation;
pub mod orchestrator;
pub mod repair;
pub mod validator;
pub mod versions;

pub use conversation::ConversationService;
pub use orchestrator::{AgentOrchestrator, ControlSignal};
pub use repair::{AttemptRecord, RepairLoop, RepairReport};
pub use validator::{ValidationOutcome, Validator};
pub use versions::{InMemorySessionRepository, InMemoryVersionRepository, VersionService};
