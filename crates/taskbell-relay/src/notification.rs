// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task lifecycle event as carried on the broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskbell_core::{Embed, EmbedField, Message, NotificationError};

/// A task lifecycle event. The JSON form uses camelCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNotification {
    /// Event type, e.g. `task.created`.
    #[serde(rename = "type")]
    pub kind: String,
    pub task_id: String,
    pub task_title: String,
    /// Lifecycle action, e.g. `created`, `completed`.
    pub action: String,
    /// Chat channel the event is announced in.
    pub channel_id: String,
    pub guild_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TaskNotification {
    pub fn new(
        task_id: impl Into<String>,
        task_title: impl Into<String>,
        action: impl Into<String>,
        channel_id: impl Into<String>,
        guild_id: impl Into<String>,
    ) -> Self {
        let action = action.into();
        Self {
            kind: format!("task.{}", action.to_lowercase()),
            task_id: task_id.into(),
            task_title: task_title.into(),
            action,
            channel_id: channel_id.into(),
            guild_id: guild_id.into(),
            user_id: None,
            description: None,
            timestamp: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn routing_key(&self) -> String {
        format!("task.{}", self.action.to_lowercase())
    }

    /// Parses and checks a broker payload. Any error means the payload can
    /// never be delivered.
    pub fn from_slice(body: &[u8]) -> Result<Self, NotificationError> {
        let notification: Self = serde_json::from_slice(body).map_err(|e| {
            NotificationError::queue("malformed task notification", e)
        })?;
        notification.validate()?;
        Ok(notification)
    }

    fn validate(&self) -> Result<(), NotificationError> {
        let missing = [
            ("taskId", &self.task_id),
            ("action", &self.action),
            ("channelId", &self.channel_id),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());
        match missing {
            Some((field, _)) => Err(NotificationError::Queue {
                message: format!("task notification has an empty `{field}`"),
                source: None,
            }),
            None => Ok(()),
        }
    }

    /// Builds the outbound chat message addressed to `channel_id`.
    pub fn to_message(&self) -> Message {
        let action = self.action.to_lowercase();
        let mut fields = vec![
            EmbedField {
                name: "Task".to_string(),
                value: self.task_id.clone(),
                inline: true,
            },
            EmbedField {
                name: "Action".to_string(),
                value: action.clone(),
                inline: true,
            },
        ];
        if let Some(user) = &self.user_id {
            fields.push(EmbedField {
                name: "By".to_string(),
                value: format!("<@{user}>"),
                inline: true,
            });
        }
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let embed = Embed {
            title: format!("Task {action}"),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| self.task_title.clone()),
            color: action_color(&action),
            fields,
            timestamp: Some(timestamp),
        };

        Message::new(format!("Task \"{}\" {action}", self.task_title))
            .with_subject(format!("Task {action}"))
            .with_embed(embed)
            .with_destination(self.channel_id.clone())
            .with_metadata("task_id", serde_json::Value::String(self.task_id.clone()))
            .with_metadata("guild_id", serde_json::Value::String(self.guild_id.clone()))
    }
}

fn action_color(action: &str) -> u32 {
    match action {
        "created" => 0x2ECC71,
        "updated" => 0x3498DB,
        "completed" => 0x9B59B6,
        "deleted" => 0xE74C3C,
        _ => 0x95A5A6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_payload() {
        let body = br#"{"type":"task.created","taskId":"t1","taskTitle":"Test","action":"created","channelId":"c1","guildId":"g1"}"#;
        let n = TaskNotification::from_slice(body).unwrap();
        assert_eq!(n.kind, "task.created");
        assert_eq!(n.task_title, "Test");
        assert_eq!(n.user_id, None);
        assert_eq!(n.routing_key(), "task.created");
    }

    #[test]
    fn routing_key_lowercases_action() {
        let n = TaskNotification::new("t1", "Test", "Completed", "c1", "g1");
        assert_eq!(n.routing_key(), "task.completed");
        assert_eq!(n.kind, "task.completed");
    }

    #[test]
    fn rejects_invalid_json_and_empty_channel() {
        assert!(TaskNotification::from_slice(b"not json").is_err());
        let body = br#"{"type":"task.created","taskId":"t1","taskTitle":"Test","action":"created","channelId":"","guildId":"g1"}"#;
        let err = TaskNotification::from_slice(body).unwrap_err();
        assert!(err.to_string().contains("channelId"));
    }

    #[test]
    fn message_addresses_channel_and_mentions_title() {
        let n = TaskNotification::new("t1", "Write docs", "created", "c1", "g1").with_user("u9");
        let message = n.to_message();
        assert!(message.payload.content.contains("Write docs"));
        assert!(message.payload.content.contains("created"));
        assert_eq!(message.options.destination.as_deref(), Some("c1"));
        assert!(message.options.rich);
        let embed = message.payload.embed.unwrap();
        assert_eq!(embed.color, 0x2ECC71);
        assert!(embed.fields.iter().any(|f| f.value == "<@u9>"));
    }

    #[test]
    fn serializes_without_absent_optionals() {
        let json = serde_json::to_value(TaskNotification::new("t1", "T", "created", "c1", "g1")).unwrap();
        assert_eq!(json["taskId"], "t1");
        assert_eq!(json["type"], "task.created");
        assert!(json.get("userId").is_none());
    }
}
