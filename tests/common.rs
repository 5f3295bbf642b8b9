#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    unreachable_pub,
    dead_code
)]
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::protocol::Message};
use wa_relay::AppBuilder;
use wa_relay::adapters::store::{MemoryMessageStore, MessageStore};
use wa_relay::api::MgmtState;
use wa_relay::config::Config;

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.ingest.import_on_start = false;
    config.realtime.channel_capacity = 64;
    config
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryMessageStore>,
    pub config: Config,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        wa_relay::telemetry::init_test_telemetry();

        let store = Arc::new(MemoryMessageStore::new());
        let shared: Arc<dyn MessageStore> = store.clone();
        let app = AppBuilder::new(config.clone()).with_store(shared).build().unwrap();
        app.seed(&config.ingest).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let api_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_addr = api_listener.local_addr().unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let app_router = wa_relay::api::app_router(app.services, shutdown_rx.clone());
        let mgmt_router = wa_relay::api::mgmt_router(MgmtState { health_service: app.health_service });

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(api_listener, app_router)
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router)
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            server_url: format!("http://{api_addr}"),
            ws_url: format!("ws://{api_addr}/gateway"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            store,
            config,
            shutdown_tx,
        }
    }

    pub async fn post_webhook(&self, payload: &Value) -> reqwest::Response {
        self.client.post(format!("{}/webhook", self.server_url)).json(payload).send().await.unwrap()
    }

    pub async fn conversations(&self) -> Vec<Value> {
        let resp = self.client.get(format!("{}/conversations", self.server_url)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        resp.json().await.unwrap()
    }

    pub async fn connect_ws(&self) -> TestWsClient {
        let (stream, _) = tokio_tungstenite::connect_async(self.ws_url.as_str()).await.unwrap();
        TestWsClient { stream }
    }
}

pub struct TestWsClient {
    pub stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestWsClient {
    /// Next JSON event frame, skipping control frames.
    pub async fn receive_event_timeout(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.stream.next()).await.ok()??;
            match frame.ok()? {
                Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    pub async fn receive_raw_timeout(&mut self, timeout: Duration) -> Option<Result<Message, ()>> {
        let frame = tokio::time::timeout(timeout, self.stream.next()).await.ok()??;
        Some(frame.map_err(|_| ()))
    }
}

pub fn message_payload(id: &str, wa_id: &str, name: &str, timestamp: i64, body: &str) -> Value {
    json!({
        "payload_type": "whatsapp_webhook",
        "metaData": {
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "contacts": [{ "profile": { "name": name }, "wa_id": wa_id }],
                        "messages": [{
                            "from": wa_id,
                            "id": id,
                            "timestamp": timestamp.to_string(),
                            "text": { "body": body },
                            "type": "text"
                        }],
                        "messaging_product": "whatsapp"
                    }
                }]
            }],
            "object": "whatsapp_business_account"
        }
    })
}

pub fn status_payload(id: &str, status: &str) -> Value {
    json!({
        "payload_type": "whatsapp_webhook",
        "metaData": {
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "statuses": [{ "id": id, "meta_msg_id": id, "status": status, "recipient_id": "919937320320" }]
                    }
                }]
            }]
        }
    })
}
