//! Conversation message types.
//!
//! Messages form an append-only transcript: append order equals role
//! execution order equals display order.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::geometry::BoundingBox;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
    System,
}

/// The specialized reasoning roles of the design team. A closed set: role
/// dispatch is an enum match, never reflection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentRole {
    Coordinator,
    Requirements,
    Designer,
    Engineer,
    Physics,
    Manufacturing,
    Validator,
}

/// What a message carries beyond plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    /// An agent asking the user a question (optionally with options).
    Question,
    /// An agent suggesting an improvement.
    Suggestion,
    /// A generated code block.
    Code,
    /// Validation results.
    Validation,
}

/// Structured payload attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl MessageData {
    pub fn is_empty(&self) -> bool {
        self.options.is_empty() && self.code.is_none() && self.bounding_box.is_none()
    }
}

/// A single message in the transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<AgentRole>,
    #[serde(default)]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "MessageData::is_empty")]
    pub data: MessageData,
    /// ISO 8601 creation timestamp.
    pub timestamp: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(MessageRole::User, None, MessageKind::Text, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::build(MessageRole::System, None, MessageKind::Text, content)
    }

    pub fn agent(role: AgentRole, content: impl Into<String>) -> Self {
        Self::build(MessageRole::Agent, Some(role), MessageKind::Text, content)
    }

    pub fn question(role: AgentRole, content: impl Into<String>, options: Vec<String>) -> Self {
        let mut message = Self::build(
            MessageRole::Agent,
            Some(role),
            MessageKind::Question,
            content,
        );
        message.data.options = options;
        message
    }

    pub fn code(
        role: AgentRole,
        content: impl Into<String>,
        script: impl Into<String>,
        bounding_box: Option<BoundingBox>,
    ) -> Self {
        let mut message = Self::build(MessageRole::Agent, Some(role), MessageKind::Code, content);
        message.data.code = Some(script.into());
        message.data.bounding_box = bounding_box;
        message
    }

    pub fn validation(role: AgentRole, content: impl Into<String>) -> Self {
        Self::build(
            MessageRole::Agent,
            Some(role),
            MessageKind::Validation,
            content,
        )
    }

    fn build(
        role: MessageRole,
        agent_role: Option<AgentRole>,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            agent_role,
            kind,
            content: content.into(),
            data: MessageData::default(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
