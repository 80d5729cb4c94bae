//! Visual reference attachments (photos and sketches).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ForgeError, Result};

/// Attachment kinds the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// A reference photo.
    Image,
    /// A hand-drawn or digital sketch.
    Sketch,
}

/// MIME types accepted for visual references.
const SUPPORTED_MIME_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/gif"];

/// An image or sketch attached to a design session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub kind: AttachmentKind,
    /// Base64-encoded binary content.
    pub data: String,
    pub mime_type: String,
    #[serde(default)]
    pub name: String,
}

impl Attachment {
    /// Creates an attachment, rejecting unsupported MIME types immediately
    /// (an input error, never retried).
    pub fn new(
        kind: AttachmentKind,
        data: impl Into<String>,
        mime_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let mime_type = mime_type.into();
        if !SUPPORTED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(ForgeError::input(format!(
                "Unsupported attachment type: {}",
                mime_type
            )));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            kind,
            data: data.into(),
            mime_type,
            name: name.into(),
        })
    }

    /// Creates an attachment from raw bytes, encoding them for transport.
    pub fn from_bytes(
        kind: AttachmentKind,
        bytes: &[u8],
        mime_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        Self::new(kind, BASE64_STANDARD.encode(bytes), mime_type, name)
    }

    pub fn is_sketch(&self) -> bool {
        self.kind == AttachmentKind::Sketch
    }
}
