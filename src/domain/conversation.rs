use crate::domain::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;
use time::macros::format_description;

/// Preview shown for a conversation whose last message has no text body.
pub const UNSUPPORTED_PREVIEW: &str = "[Unsupported]";

/// Read-time grouping of messages sharing a `conversation_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub last_message_preview: String,
    #[serde(default)]
    pub last_message_time: String,
}

impl Conversation {
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self { conversation_id: conversation_id.into(), display_name: display_name.into(), ..Self::default() }
    }

    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Timestamp of the chronologically last message, or 0 when empty.
    #[must_use]
    pub fn last_activity(&self) -> i64 {
        self.messages.iter().map(|m| m.timestamp).max().unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    /// The first non-empty name sticks.
    pub fn adopt_display_name(&mut self, name: &str) {
        if self.display_name.is_empty() && !name.is_empty() {
            self.display_name = name.to_string();
        }
    }

    /// Re-sorts messages and recomputes the preview fields.
    pub fn refresh(&mut self) {
        sort_messages(&mut self.messages);
        match self.messages.last() {
            Some(last) => {
                self.last_message_preview = last.text_body().unwrap_or(UNSUPPORTED_PREVIEW).to_string();
                self.last_message_time = format_clock(last.timestamp);
            }
            None => {
                self.last_message_preview.clear();
                self.last_message_time.clear();
            }
        }
    }
}

/// Stable ascending sort on timestamp, the only ordering key.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp);
}

/// Refreshes every conversation and orders the list by last activity, most recent first.
///
/// Conversations without messages were just opened and stay on top.
pub fn finalize(conversations: &mut [Conversation]) {
    for conversation in conversations.iter_mut() {
        conversation.refresh();
    }
    conversations.sort_by_key(|c| std::cmp::Reverse((c.messages.is_empty(), c.last_activity())));
}

/// Folds the full message set into the conversation list.
#[must_use]
pub fn project(mut messages: Vec<Message>) -> Vec<Conversation> {
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut conversations: Vec<Conversation> = Vec::new();

    for message in messages {
        let slot = *index.entry(message.conversation_id.clone()).or_insert_with(|| {
            conversations.push(Conversation::new(message.conversation_id.clone(), String::new()));
            conversations.len() - 1
        });
        let conversation = &mut conversations[slot];
        conversation.adopt_display_name(&message.display_name);
        conversation.messages.push(message);
    }

    finalize(&mut conversations);
    conversations
}

/// Formats a unix timestamp as `HH:MM` in UTC.
#[must_use]
pub fn format_clock(timestamp: i64) -> String {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|dt| dt.format(format_description!("[hour]:[minute]")).ok())
        .unwrap_or_default()
}

/// Formats a message timestamp: the clock time for today, the calendar date otherwise.
#[must_use]
pub fn format_message_time(timestamp: i64, now: OffsetDateTime) -> String {
    if timestamp == 0 {
        return String::new();
    }
    let Ok(at) = OffsetDateTime::from_unix_timestamp(timestamp) else {
        return String::new();
    };
    if at.date() == now.date() {
        return format_clock(timestamp);
    }
    at.format(format_description!("[year]-[month]-[day]")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{DeliveryStatus, MessageContent};
    use serde_json::json;

    fn msg(id: &str, conversation_id: &str, name: &str, timestamp: i64, body: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            display_name: name.to_string(),
            from: conversation_id.to_string(),
            timestamp,
            content: MessageContent::text(body),
            delivery_status: DeliveryStatus::Sent,
        }
    }

    #[test]
    fn test_messages_ordered_by_timestamp_not_insertion() {
        let conversations = project(vec![msg("a", "w1", "", 100, "A"), msg("b", "w1", "", 50, "B")]);

        assert_eq!(conversations.len(), 1);
        let ids: Vec<_> = conversations[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(conversations[0].last_message_preview, "A");
    }

    #[test]
    fn test_conversations_ordered_by_last_activity_desc() {
        let conversations = project(vec![msg("a", "older", "", 100, "x"), msg("b", "newer", "", 200, "y")]);

        let order: Vec<_> = conversations.iter().map(|c| c.conversation_id.as_str()).collect();
        assert_eq!(order, ["newer", "older"]);
    }

    #[test]
    fn test_first_non_empty_display_name_wins() {
        let conversations = project(vec![
            msg("a", "w1", "", 10, "x"),
            msg("b", "w1", "Ravi", 20, "y"),
            msg("c", "w1", "Ravi Kumar", 30, "z"),
        ]);

        assert_eq!(conversations[0].display_name, "Ravi");
    }

    #[test]
    fn test_preview_placeholder_for_non_text() {
        let mut image = msg("a", "w1", "", 10, "");
        image.content = MessageContent::from_parts("image".to_string(), json!({ "id": "media" }));

        let conversations = project(vec![msg("t", "w1", "", 5, "earlier"), image]);
        assert_eq!(conversations[0].last_message_preview, UNSUPPORTED_PREVIEW);
    }

    #[test]
    fn test_last_message_time_is_clock() {
        // 1970-01-01T01:02:00Z
        let conversations = project(vec![msg("a", "w1", "", 3720, "x")]);
        assert_eq!(conversations[0].last_message_time, "01:02");
    }

    #[test]
    fn test_empty_conversation_has_blank_derived_fields() {
        let mut conversations = vec![Conversation::new("w1", "w1")];
        finalize(&mut conversations);
        assert!(conversations[0].last_message_preview.is_empty());
        assert!(conversations[0].last_message_time.is_empty());
    }

    #[test]
    fn test_format_message_time() {
        let now = OffsetDateTime::from_unix_timestamp(1_754_400_000).unwrap();
        let same_day = 1_754_400_000 - 60;
        let earlier = 1_754_400_000 - 3 * 86_400;

        assert_eq!(format_message_time(same_day, now), format_clock(same_day));
        assert_eq!(format_message_time(earlier, now), "2025-08-02");
        assert_eq!(format_message_time(0, now), "");
    }
}
