//! Inbound WhatsApp Business webhook shapes.
//!
//! Accepts the Graph API body (`{ object, entry }`) and the seeded demo form that wraps
//! the same object in a `metaData` field.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, rename = "metaData")]
    pub meta_data: Option<Notification>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Option<Vec<Entry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Option<Vec<Entry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Option<Vec<Change>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<ChangeValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<ProviderMessage>,
    #[serde(default)]
    pub statuses: Vec<ProviderStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub wa_id: Option<String>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMessage {
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub timestamp: Value,
    #[serde(rename = "type")]
    pub kind: String,
    /// Content object named after `kind` (`text`, `image`, ...) plus any other fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderStatus {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub meta_msg_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub recipient_id: Option<String>,
}

impl WebhookPayload {
    /// Locates `entry[0].changes[0].value`, looking inside `metaData` when present.
    #[must_use]
    pub fn change_value(&self) -> Option<&ChangeValue> {
        let entries = match &self.meta_data {
            Some(meta) => meta.entry.as_ref(),
            None => self.entry.as_ref(),
        }?;
        entries.first()?.changes.as_ref()?.first()?.value.as_ref()
    }
}

impl ProviderStatus {
    /// Primary id, falling back to the meta id some providers send instead.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty()).or_else(|| self.meta_msg_id.as_deref())
    }
}
