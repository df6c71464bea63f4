//! Presence records kept for every identity that ever registered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection status for one display name, updated on every connect and
/// disconnect and never deleted for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatus {
    pub username: String,
    pub connected: bool,
    #[serde(rename = "lastSeen")]
    pub last_seen: DateTime<Utc>,
    #[serde(rename = "connectedAt")]
    pub connected_at: DateTime<Utc>,
}

impl UserStatus {
    /// Record a fresh connection for `username`, stamping both timestamps.
    pub fn connected_now(username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            username: username.into(),
            connected: true,
            last_seen: now,
            connected_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names_match_schema() {
        let status = UserStatus::connected_now("alice");
        let value: serde_json::Value = serde_json::to_value(&status).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["username"], "alice");
        assert_eq!(obj["connected"], true);
        assert!(obj.contains_key("lastSeen"));
        assert!(obj.contains_key("connectedAt"));
    }
}
