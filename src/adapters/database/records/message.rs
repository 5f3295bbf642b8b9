use crate::domain::message::{Message, MessageContent};
use serde_json::Value;
use sqlx::types::Json;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: String,
    pub(crate) conversation_id: String,
    pub(crate) display_name: String,
    pub(crate) sender: String,
    pub(crate) sent_at: i64,
    pub(crate) kind: String,
    pub(crate) content: Json<Value>,
    pub(crate) delivery_status: String,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            display_name: record.display_name,
            from: record.sender,
            timestamp: record.sent_at,
            content: MessageContent::from_parts(record.kind, record.content.0),
            // The column carries a CHECK constraint over the known statuses.
            delivery_status: record.delivery_status.parse().unwrap_or_default(),
        }
    }
}
