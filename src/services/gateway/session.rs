use crate::config::RealtimeConfig;
use crate::domain::event::RealtimeEvent;
use crate::services::gateway::Metrics;
use crate::services::realtime_service::{RecvError, Subscription};
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

pub struct Session {
    pub request_id: String,
    pub socket: WebSocket,
    pub subscription: Subscription,
    pub metrics: Metrics,
    pub config: RealtimeConfig,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

fn encode(event: &RealtimeEvent) -> Option<WsMessage> {
    match serde_json::to_string(event) {
        Ok(text) => Some(WsMessage::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, event = event.name(), "Failed to encode event frame");
            None
        }
    }
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            request_id = %self.request_id,
            otel.kind = "server",
            ws.session_id = %Uuid::new_v4()
        )
    )]
    pub(crate) async fn run(self) {
        let Self { socket, mut subscription, metrics, config, mut shutdown_rx, .. } = self;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let (mut ws_sink, mut ws_stream) = socket.split();

        let ping_every = Duration::from_secs(config.ping_interval_secs.max(1));
        let silence_limit = ping_every + Duration::from_secs(config.ping_timeout_secs);
        let mut ping_interval = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() { break; }
                }

                msg = ws_stream.next() => {
                    let continue_loop = match msg {
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => false,
                        Some(Ok(WsMessage::Text(t))) => {
                            tracing::debug!(len = t.len(), "Ignoring inbound text frame");
                            true
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::debug!("Ignoring inbound binary frame");
                            true
                        }
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => true,
                    };
                    if !continue_loop { break; }
                    last_seen = Instant::now();
                }

                result = subscription.recv() => {
                    let frame = match result {
                        Ok(event) => encode(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Subscriber lagged, requesting resync");
                            metrics.dropped_events_total.add(skipped, &[]);
                            encode(&RealtimeEvent::Resync)
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if let Some(frame) = frame {
                        if ws_sink.send(frame).await.is_err() { break; }
                        metrics.frames_sent_total.add(1, &[]);
                    }
                }

                _ = ping_interval.tick() => {
                    if last_seen.elapsed() > silence_limit {
                        tracing::info!("Client unresponsive, closing WebSocket");
                        break;
                    }
                    if ws_sink.send(WsMessage::Ping(Vec::<u8>::new().into())).await.is_err() { break; }
                }
            }
        }

        let _ = ws_sink.close().await;

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}
