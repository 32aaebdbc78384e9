// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Persisted chat conversation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A message of a chat [`Thread`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Tool invocations requested by the assistant, as provided by the LLM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

impl Message {
    pub fn new(thread: &Thread, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id: thread.id,
            role,
            content: content.into(),
            created_at: Utc::now(),
            tool_calls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Role::User, "user")]
    #[case(Role::Assistant, "assistant")]
    #[case(Role::System, "system")]
    #[case(Role::Tool, "tool")]
    fn role_is_lowercase(#[case] role: Role, #[case] expected: &str) {
        assert_eq!(json!(expected), serde_json::to_value(role).unwrap());
        assert_eq!(expected, role.to_string());
    }

    #[test]
    fn message_references_thread() {
        let thread = Thread::new("Kitchen lights");
        let msg = Message::new(&thread, Role::User, "Turn on the kitchen lights");
        assert_eq!(thread.id, msg.thread_id);
        assert_eq!(thread.created_at, thread.updated_at);
    }

    #[test]
    fn deserialize_stored_message() {
        let msg: Message = serde_json::from_value(json!({
            "id": "6f0e2c1a-3d5b-4c8e-9a7f-1b2c3d4e5f60",
            "thread_id": "0b7d7c43-1e4a-4a8e-8f3c-2d9e6a1b5c70",
            "role": "assistant",
            "content": "",
            "created_at": "2026-03-01T18:30:00Z",
            "tool_calls": [{"name": "call_service", "arguments": {"entity_id": "light.kitchen"}}]
        }))
        .unwrap();

        assert_eq!(Role::Assistant, msg.role);
        assert_eq!(
            "2026-03-01T18:30:00+00:00",
            msg.created_at.to_rfc3339()
        );
        assert_eq!(
            Some("light.kitchen"),
            msg.tool_calls
                .as_ref()
                .and_then(|v| v[0]["arguments"]["entity_id"].as_str())
        );
    }

    #[test]
    fn message_without_tool_calls_omits_field() {
        let thread = Thread::new("t");
        let value = serde_json::to_value(Message::new(&thread, Role::System, "hi")).unwrap();
        assert!(value.get("tool_calls").is_none());
        assert_eq!(json!("system"), value["role"]);
    }
}
