use crate::domain::message::{DeliveryStatus, Message, MessageContent, StatusPatch, TEXT_KIND, parse_timestamp};
use crate::domain::payload::{ChangeValue, ProviderMessage, ProviderStatus, WebhookPayload};
use crate::error::{AppError, Result};
use serde_json::Value;

/// Result of normalizing one webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Message(Message),
    StatusPatches(Vec<StatusPatch>),
    Noop,
}

/// Parses a raw webhook body.
///
/// # Errors
/// Returns `AppError::MalformedPayload` if the body is not a webhook object.
pub fn parse(body: &[u8]) -> Result<WebhookPayload> {
    serde_json::from_slice(body).map_err(|e| AppError::MalformedPayload(e.to_string()))
}

/// Maps a webhook payload to a canonical record or a set of status patches.
///
/// # Errors
/// Returns `AppError::MalformedPayload` if the change structure is missing or a field
/// cannot be interpreted.
pub fn normalize(payload: &WebhookPayload) -> Result<Normalized> {
    let value = payload
        .change_value()
        .ok_or_else(|| AppError::MalformedPayload("missing entry[0].changes[0].value".to_string()))?;

    if let Some(message) = value.messages.first() {
        return normalize_message(value, message).map(Normalized::Message);
    }

    if !value.statuses.is_empty() {
        return Ok(Normalized::StatusPatches(normalize_statuses(&value.statuses)));
    }

    Ok(Normalized::Noop)
}

fn normalize_message(value: &ChangeValue, message: &ProviderMessage) -> Result<Message> {
    let contact = value.contacts.first();

    let conversation_id = contact
        .and_then(|c| c.wa_id.as_deref())
        .filter(|id| !id.is_empty())
        .unwrap_or(&message.from)
        .to_string();

    let display_name = contact
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.clone())
        .unwrap_or_default();

    let timestamp = parse_timestamp(&message.timestamp).ok_or_else(|| {
        AppError::MalformedPayload(format!("message {} has an invalid timestamp", message.id))
    })?;

    let payload = message.fields.get(&message.kind).cloned().unwrap_or(Value::Null);
    let content = MessageContent::from_parts(message.kind.clone(), payload);
    if message.kind == TEXT_KIND && content.text_body().is_none() {
        return Err(AppError::MalformedPayload(format!("text message {} has no body", message.id)));
    }

    Ok(Message {
        id: message.id.clone(),
        conversation_id,
        display_name,
        from: message.from.clone(),
        timestamp,
        content,
        delivery_status: DeliveryStatus::Sent,
    })
}

/// Entries without a message id or with a status outside the lifecycle are skipped.
fn normalize_statuses(statuses: &[ProviderStatus]) -> Vec<StatusPatch> {
    let mut patches = Vec::with_capacity(statuses.len());
    for status in statuses {
        let Some(target_id) = status.target_id() else {
            tracing::warn!(status = %status.status, "Skipping status entry without a message id");
            continue;
        };
        match status.status.parse::<DeliveryStatus>() {
            Ok(new_status) => patches.push(StatusPatch { target_id: target_id.to_string(), new_status }),
            Err(e) => tracing::warn!(message_id = %target_id, error = %e, "Skipping status entry"),
        }
    }
    patches
}
