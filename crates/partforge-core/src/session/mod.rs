//! Session domain module.
//!
//! - `model`: the `Session` entity and its transport-facing `SessionView`
//! - `message`: transcript message types and agent roles
//! - `phase`: the conversation phase state machine
//! - `repository`: persistence contract for sessions

mod message;
mod model;
mod phase;
mod repository;

pub use message::{AgentRole, Message, MessageData, MessageKind, MessageRole};
pub use model::{Session, SessionView, SiblingPart};
pub use phase::ConversationPhase;
pub use repository::SessionRepository;
