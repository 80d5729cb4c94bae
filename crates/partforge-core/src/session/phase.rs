//! Conversation phase state machine.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Phases of a design conversation.
///
/// The forward path is gathering → analyzing → designing → reviewing →
/// finalizing → complete. The single permitted backward edge is a re-entry
/// into `analyzing` from any non-complete phase, taken when a new user
/// message invalidates prior assumptions (e.g. a dimension changes after a
/// script already exists). Abandonment is implicit: a session simply stops
/// being used.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConversationPhase {
    #[default]
    Gathering,
    Analyzing,
    Designing,
    Reviewing,
    Finalizing,
    Complete,
}

impl ConversationPhase {
    /// Whether moving to `next` follows a permitted edge.
    pub fn can_transition_to(&self, next: ConversationPhase) -> bool {
        use ConversationPhase::*;
        match (self, next) {
            (Gathering, Analyzing) => true,
            (Analyzing, Designing) => true,
            (Designing, Reviewing) => true,
            (Reviewing, Finalizing) => true,
            (Finalizing, Complete) => true,
            // Quick action: force-skip gathering/analyzing with whatever
            // requirements exist.
            (Gathering, Designing) | (Analyzing, Designing) => true,
            // The only backward edge: a requirement-invalidating user
            // message re-enters analysis. Complete sessions are frozen.
            (Designing, Analyzing)
            | (Reviewing, Analyzing)
            | (Finalizing, Analyzing) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationPhase::Complete)
    }
}
