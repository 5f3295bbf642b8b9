use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sender token carried by messages composed in the web client.
pub const SELF_SENDER: &str = "me";

/// Prefix of ids minted by clients for optimistic local sends.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Content kind tag for plain text messages.
pub const TEXT_KIND: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown delivery status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Message payload keyed by its `kind` tag.
///
/// Kinds without a dedicated variant keep the provider's object verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawContent", into = "RawContent")]
pub enum MessageContent {
    Text { body: String },
    Other { kind: String, payload: Value },
}

impl MessageContent {
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Builds content from a kind tag and its JSON object.
    #[must_use]
    pub fn from_parts(kind: String, payload: Value) -> Self {
        if kind == TEXT_KIND
            && let Some(body) = payload.get("body").and_then(Value::as_str)
        {
            return Self::Text { body: body.to_string() };
        }
        Self::Other { kind, payload }
    }

    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        match self {
            Self::Text { body } => (TEXT_KIND.to_string(), serde_json::json!({ "body": body })),
            Self::Other { kind, payload } => (kind, payload),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => TEXT_KIND,
            Self::Other { kind, .. } => kind,
        }
    }

    #[must_use]
    pub fn text_body(&self) -> Option<&str> {
        match self {
            Self::Text { body } => Some(body),
            Self::Other { .. } => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawContent {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    content: Value,
}

impl From<RawContent> for MessageContent {
    fn from(raw: RawContent) -> Self {
        Self::from_parts(raw.kind, raw.content)
    }
}

impl From<MessageContent> for RawContent {
    fn from(content: MessageContent) -> Self {
        let (kind, content) = content.into_parts();
        Self { kind, content }
    }
}

/// Canonical message record. `id` is the dedup key across the store.
///
/// Every field defaults when absent so clients can fold partial records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub from: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
    #[serde(flatten)]
    pub content: MessageContent,
    #[serde(default)]
    pub delivery_status: DeliveryStatus,
}

impl Message {
    #[must_use]
    pub fn text_body(&self) -> Option<&str> {
        self.content.text_body()
    }

    #[must_use]
    pub fn is_self_authored(&self) -> bool {
        self.from == SELF_SENDER
    }
}

/// Targeted delivery-status change for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPatch {
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub new_status: DeliveryStatus,
}

/// Reads a unix timestamp sent as an integer or a decimal string.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value).unwrap_or_default())
}
