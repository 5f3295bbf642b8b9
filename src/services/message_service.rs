use crate::adapters::store::MessageStore;
use crate::domain::event::RealtimeEvent;
use crate::domain::message::{DeliveryStatus, Message, MessageContent, SELF_SENDER, TEMP_ID_PREFIX};
use crate::error::{AppError, Result};
use crate::services::realtime_service::RealtimeService;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_CLIENT_ID_LEN: usize = 128;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("wa-relay");
        Self {
            sent_total: meter
                .u64_counter("wa_relay_messages_sent_total")
                .with_description("Total messages composed through the API")
                .build(),
        }
    }
}

/// A message composed by the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub display_name: String,
    pub body: String,
    /// Id the client already shows. Adopted as the permanent id when it is a `temp_` id.
    pub client_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    realtime: RealtimeService,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, realtime: RealtimeService) -> Self {
        Self { store, realtime, metrics: Metrics::new() }
    }

    /// Persists an outgoing text message and broadcasts it as `new_message`.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the conversation id or body is blank.
    /// Returns `AppError::Conflict` if the client id already names a different message.
    /// Returns `AppError::Database` if the message cannot be stored.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, request),
        fields(conversation_id = %request.conversation_id, message_id = tracing::field::Empty)
    )]
    pub async fn send(&self, request: NewMessage) -> Result<Message> {
        let conversation_id = request.conversation_id.trim();
        if conversation_id.is_empty() {
            return Err(AppError::BadRequest("conversationId must not be empty".to_string()));
        }
        let body = request.body.trim();
        if body.is_empty() {
            return Err(AppError::BadRequest("bodyText must not be empty".to_string()));
        }

        let id = match request.client_id.as_deref().map(str::trim) {
            Some(client_id) if is_client_id(client_id) => client_id.to_string(),
            _ => format!("local_{}", Uuid::now_v7().simple()),
        };
        tracing::Span::current().record("message_id", id.as_str());

        let message = Message {
            id,
            conversation_id: conversation_id.to_string(),
            display_name: request.display_name,
            from: SELF_SENDER.to_string(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
            content: MessageContent::text(body),
            delivery_status: DeliveryStatus::Sent,
        };

        let result = self.store_once(&message).await;
        let status = match &result {
            Ok(_) => "success",
            Err(AppError::Conflict(_)) => "conflict",
            Err(_) => "failure",
        };
        self.metrics.sent_total.add(1, &[KeyValue::new("status", status)]);
        result
    }

    async fn store_once(&self, message: &Message) -> Result<Message> {
        if let Some(existing) = self.store.find(&message.id).await? {
            if is_retry_of(&existing, message) {
                tracing::debug!("Send retried, returning the stored record");
                return Ok(existing);
            }
            return Err(AppError::Conflict(format!("message id {} is already in use", message.id)));
        }

        self.store.upsert(message).await?;
        self.realtime.publish(RealtimeEvent::NewMessage(message.clone()));
        Ok(message.clone())
    }
}

fn is_client_id(id: &str) -> bool {
    id.len() > TEMP_ID_PREFIX.len() && id.len() <= MAX_CLIENT_ID_LEN && id.starts_with(TEMP_ID_PREFIX)
}

fn is_retry_of(existing: &Message, message: &Message) -> bool {
    existing.is_self_authored()
        && existing.conversation_id == message.conversation_id
        && existing.text_body() == message.text_body()
}
