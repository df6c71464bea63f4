//! Inbound and control frames.

use serde::{Deserialize, Serialize};

use crate::message::ImageData;
use crate::presence::UserStatus;

/// One frame received from a client: text plus an optional attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "hasImage")]
    pub has_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,
}

/// Machine-readable error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UsernameTaken,
    InvalidImage,
}

/// Control frames pushed by the server outside the chat envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlFrame {
    Error {
        message: String,
        code: ErrorCode,
    },
    ConnectionSuccess {
        message: String,
        username: String,
    },
    UserList {
        users: Vec<UserStatus>,
    },
}

impl ControlFrame {
    /// Build the rejection frame for a duplicate display name.
    pub fn username_taken(username: &str) -> Self {
        Self::Error {
            message: format!("the username '{username}' is already in use, choose another name"),
            code: ErrorCode::UsernameTaken,
        }
    }

    /// Build the acknowledgement sent after a successful registration.
    pub fn connection_success(username: &str) -> Self {
        Self::ConnectionSuccess {
            message: format!("connected successfully as {username}"),
            username: username.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_frame_carries_tag_and_code() {
        let frame = ControlFrame::username_taken("bob");
        let value: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "USERNAME_TAKEN");
        assert!(value["message"].as_str().unwrap().contains("bob"));
    }

    #[test]
    fn success_frame_uses_camel_case_tag() {
        let frame = ControlFrame::connection_success("alice");
        let value: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "connectionSuccess");
        assert_eq!(value["username"], "alice");
    }

    #[test]
    fn user_list_frame_nests_statuses() {
        let frame = ControlFrame::UserList {
            users: vec![crate::UserStatus::connected_now("alice")],
        };
        let value: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "userList");
        assert_eq!(value["users"][0]["username"], "alice");
    }

    #[test]
    fn inbound_frame_tolerates_missing_fields() {
        let frame: InboundFrame = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(frame.content, "hi");
        assert!(!frame.has_image);
        assert!(frame.image.is_none());
    }
}
