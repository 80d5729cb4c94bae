//! Session domain model.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;
use super::phase::ConversationPhase;
use crate::attachment::Attachment;
use crate::geometry::GeometrySummary;
use crate::requirements::DesignRequirements;

/// A sibling part from the same project, given to the generator as
/// context so new parts stay consistent with existing ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiblingPart {
    pub name: String,
    pub script: String,
}

/// One continuous natural-language design conversation.
///
/// The session owns the append-only transcript, the structured
/// requirements record, the current candidate script, and the geometry
/// facts derived from it. It is mutated exclusively through the
/// conversation service's entry points; collaborators read it through a
/// view, never mutate it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format).
    pub id: String,
    /// The persisted part this conversation refines, if any.
    pub part_id: Option<String>,
    pub phase: ConversationPhase,
    pub messages: Vec<Message>,
    pub requirements: DesignRequirements,
    pub current_script: Option<String>,
    pub current_geometry: Option<GeometrySummary>,
    /// Repair attempts consumed by the latest generation request.
    pub iteration_count: u32,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub sibling_parts: Vec<SiblingPart>,
    /// Set once the validator confirms the current script; gates
    /// finalizing → complete.
    #[serde(default)]
    pub validated: bool,
    /// ISO 8601 timestamps.
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    pub fn new(part_id: Option<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            part_id,
            phase: ConversationPhase::default(),
            messages: Vec::new(),
            requirements: DesignRequirements::default(),
            current_script: None,
            current_geometry: None,
            iteration_count: 0,
            attachments: Vec::new(),
            sibling_parts: Vec::new(),
            validated: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Appends a message to the transcript. The transcript is append-only;
    /// existing messages are never rewritten.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now().to_rfc3339();
    }

    pub fn has_visual_reference(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// The transcript tail rendered for prompt context.
    pub fn transcript_tail(&self, count: usize) -> String {
        let start = self.messages.len().saturating_sub(count);
        self.messages[start..]
            .iter()
            .map(|message| {
                let speaker = match message.agent_role {
                    Some(role) => role.to_string(),
                    None => "user".to_string(),
                };
                format!("[{}]: {}", speaker, message.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The read-only surface exposed to the transport layer. Everything else
/// on the session is internal to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub phase: ConversationPhase,
    pub requirements: DesignRequirements,
    pub messages: Vec<Message>,
    pub current_script: Option<String>,
    pub current_geometry: Option<GeometrySummary>,
    pub complete: bool,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            phase: session.phase,
            requirements: session.requirements.clone(),
            messages: session.messages.clone(),
            current_script: session.current_script.clone(),
            current_geometry: session.current_geometry.clone(),
            complete: session.phase.is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::message::AgentRole;

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new(None);
        assert_eq!(session.phase, ConversationPhase::Gathering);
        assert!(session.messages.is_empty());
        assert!(!session.validated);
    }

    #[test]
    fn test_transcript_is_append_only_ordered() {
        let mut session = Session::new(None);
        session.push_message(Message::user("first"));
        session.push_message(Message::agent(AgentRole::Coordinator, "second"));
        session.push_message(Message::user("third"));

        let contents: Vec<&str> = session
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_transcript_tail() {
        let mut session = Session::new(None);
        for i in 0..5 {
            session.push_message(Message::user(format!("message {}", i)));
        }
        let tail = session.transcript_tail(2);
        assert!(tail.contains("message 3"));
        assert!(tail.contains("message 4"));
        assert!(!tail.contains("message 2"));
    }

    #[test]
    fn test_view_mirrors_session() {
        let mut session = Session::new(Some("part-1".to_string()));
        session.push_message(Message::user("hello"));
        let view = SessionView::from(&session);
        assert_eq!(view.phase, session.phase);
        assert_eq!(view.messages.len(), 1);
        assert!(!view.complete);
    }
}
