use crate::client::cache::{ConversationCache, SEND_FAILED_ERROR, optimistic_message};
use crate::domain::conversation::Conversation;
use crate::domain::event::RealtimeEvent;
use crate::domain::message::Message;
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

type GatewayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
    #[error("Message body must not be empty")]
    EmptyMessage,
    #[error("Conversation id must not be empty")]
    MissingConversation,
}

impl From<tungstenite::Error> for ClientError {
    fn from(e: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageBody<'a> {
    conversation_id: &'a str,
    display_name: &'a str,
    body_text: &'a str,
    client_id: &'a str,
}

/// Talks to a relay server and keeps a [`ConversationCache`] in sync with it.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    cache: ConversationCache,
    reconnect_delay: Duration,
}

impl ChatClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: ConversationCache::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub const fn cache(&self) -> &ConversationCache {
        &self.cache
    }

    /// Fetches the server's conversation list.
    ///
    /// # Errors
    /// Returns `ClientError::Http` if the request fails or the server answers with an error.
    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let conversations = self
            .http
            .get(format!("{}/conversations", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Conversation>>()
            .await?;
        Ok(conversations)
    }

    /// Reloads the cache from the server's current list, keeping unsent local records.
    ///
    /// # Errors
    /// Returns `ClientError::Http` if the list cannot be fetched. The cache is left untouched.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let conversations = self.fetch_conversations().await?;
        self.cache.replace(conversations);
        Ok(())
    }

    /// Shows the message immediately, then asks the server to store it.
    ///
    /// On failure the optimistic record stays in place and the cache carries a
    /// dismissible error.
    ///
    /// # Errors
    /// Returns `ClientError::EmptyMessage` or `ClientError::MissingConversation` for
    /// blank input and `ClientError::Http` if the server could not be reached or
    /// rejected the message.
    #[tracing::instrument(err(level = "warn"), skip(self, display_name, body))]
    pub async fn send_text(
        &self,
        conversation_id: &str,
        display_name: &str,
        body: &str,
    ) -> Result<Message, ClientError> {
        let conversation_id = conversation_id.trim();
        if conversation_id.is_empty() {
            return Err(ClientError::MissingConversation);
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let pending = optimistic_message(conversation_id, display_name, body, OffsetDateTime::now_utc().unix_timestamp());
        let client_id = pending.id.clone();
        self.cache.apply_local_send(pending);

        match self.post_message(conversation_id, display_name, body, &client_id).await {
            Ok(stored) => {
                self.cache.apply_local_send(stored.clone());
                Ok(stored)
            }
            Err(e) => {
                self.cache.set_error(SEND_FAILED_ERROR);
                Err(e)
            }
        }
    }

    async fn post_message(
        &self,
        conversation_id: &str,
        display_name: &str,
        body: &str,
        client_id: &str,
    ) -> Result<Message, ClientError> {
        let request = SendMessageBody { conversation_id, display_name, body_text: body, client_id };
        let stored = self
            .http
            .post(format!("{}/messages", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<Message>()
            .await?;
        Ok(stored)
    }

    fn gateway_url(&self) -> Result<String, ClientError> {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(ClientError::InvalidUrl(self.base_url.clone()));
        };
        Ok(format!("{ws_base}/gateway"))
    }

    async fn connect(&self) -> Result<GatewayStream, ClientError> {
        let url = self.gateway_url()?;
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(stream)
    }

    /// Keeps the cache live until `shutdown_rx` flips to `true`.
    ///
    /// Each connection is followed by a full re-fetch, so events missed while
    /// disconnected are recovered. A dropped connection is retried after a fixed delay.
    #[tracing::instrument(skip_all, fields(base_url = %self.base_url))]
    pub async fn run_realtime(&self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            match self.connect().await {
                Ok(stream) => {
                    tracing::info!("Gateway connected");
                    if self.refresh().await.is_err() {
                        self.cache.mark_resync();
                    }
                    self.pump(stream, &mut shutdown_rx).await;
                    tracing::info!("Gateway disconnected");
                }
                Err(e) => tracing::warn!(error = %e, "Gateway connection failed"),
            }

            if *shutdown_rx.borrow() {
                return;
            }
            self.cache.mark_resync();

            tokio::select! {
                () = tokio::time::sleep(self.reconnect_delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() { return; }
                }
            }
        }
    }

    async fn pump(&self, mut stream: GatewayStream, shutdown_rx: &mut tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        let _ = stream.close(None).await;
                        return;
                    }
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => self.handle_frame(text.as_str()).await,
                        Some(Ok(tungstenite::Message::Close(_)) | Err(_)) | None => return,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<RealtimeEvent>(text) {
            Ok(RealtimeEvent::Resync) => {
                self.cache.mark_resync();
                // A failed re-fetch leaves the resync flag set for the next attempt.
                let _ = self.refresh().await;
            }
            Ok(event) => self.cache.apply_event(&event),
            Err(e) => tracing::warn!(error = %e, "Ignoring undecodable gateway frame"),
        }
    }
}
