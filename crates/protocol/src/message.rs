//! The chat message envelope exchanged over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved author name for hub-generated notices.
pub const SYSTEM_USERNAME: &str = "System";

/// Envelope kind, carried as the `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
    System,
    Join,
    Leave,
}

/// An inline attachment carried as an encoded data URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Base64 data URL payload
    pub data: String,
    /// Original file name
    pub name: String,
    /// MIME type
    #[serde(rename = "type")]
    pub media_type: String,
    /// Encoded size in bytes
    pub size: u64,
}

/// A chat or system message, immutable once constructed.
///
/// Constructors stamp the current time but perform no validation; callers
/// are expected to validate content and attachments before building one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,
    #[serde(rename = "hasImage")]
    pub has_image: bool,
}

impl ChatMessage {
    /// Create a plain chat message.
    pub fn new(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Message,
            image: None,
            has_image: false,
        }
    }

    /// Create a chat message carrying an attachment.
    pub fn with_image(
        username: impl Into<String>,
        content: impl Into<String>,
        image: ImageData,
    ) -> Self {
        Self {
            username: username.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Message,
            image: Some(image),
            has_image: true,
        }
    }

    /// Create a system notice authored by the reserved system identity.
    ///
    /// Callers may retag the result as [`MessageKind::Join`] or
    /// [`MessageKind::Leave`] for presence notices.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            username: SYSTEM_USERNAME.to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::System,
            image: None,
            has_image: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_has_expected_fields() {
        let msg = ChatMessage::new("alice", "hello");
        assert_eq!(msg.username, "alice");
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.kind, MessageKind::Message);
        assert!(!msg.has_image);
        assert!(msg.image.is_none());
    }

    #[test]
    fn system_message_uses_reserved_identity() {
        let msg = ChatMessage::system("bob joined the chat");
        assert_eq!(msg.username, SYSTEM_USERNAME);
        assert_eq!(msg.kind, MessageKind::System);
    }

    #[test]
    fn attachment_message_sets_flag() {
        let image = ImageData {
            data: "data:image/png;base64,AAAA".to_string(),
            name: "cat.png".to_string(),
            media_type: "image/png".to_string(),
            size: 4,
        };
        let msg = ChatMessage::with_image("alice", "look", image.clone());
        assert!(msg.has_image);
        assert_eq!(msg.image, Some(image));
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let msg = ChatMessage::new("alice", "hello");
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("username"));
        assert!(obj.contains_key("content"));
        assert!(obj.contains_key("timestamp"));
        assert!(obj.contains_key("hasImage"));
        assert_eq!(obj["type"], "message");
        // absent attachments are omitted entirely
        assert!(!obj.contains_key("image"));
    }

    #[test]
    fn kind_serializes_lowercase() {
        let mut msg = ChatMessage::system("x");
        msg.kind = MessageKind::Join;
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "join");
        msg.kind = MessageKind::Leave;
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "leave");
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let msg = ChatMessage::new("user_123", "hi there");
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
