pub(crate) mod session;

use crate::config::RealtimeConfig;
use crate::services::gateway::session::Session;
use crate::services::realtime_service::{RealtimeService, Subscription};
use axum::extract::ws::WebSocket;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) frames_sent_total: Counter<u64>,
    pub(crate) dropped_events_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("wa-relay");
        Self {
            active_connections: meter
                .i64_up_down_counter("wa_relay_websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            frames_sent_total: meter
                .u64_counter("wa_relay_websocket_frames_sent_total")
                .with_description("Total event frames written to WebSocket clients")
                .build(),
            dropped_events_total: meter
                .u64_counter("wa_relay_websocket_dropped_events_total")
                .with_description("Total events dropped for subscribers that fell behind")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges real-time events onto client WebSockets.
#[derive(Clone, Debug)]
pub struct GatewayService {
    realtime: RealtimeService,
    config: RealtimeConfig,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(realtime: RealtimeService, config: RealtimeConfig) -> Self {
        Self { realtime, config, metrics: Metrics::new() }
    }

    /// Registers a subscriber ahead of the WebSocket upgrade so that no event
    /// published after the handshake is missed.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.realtime.subscribe()
    }

    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        subscription: Subscription,
        request_id: String,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let session = Session {
            request_id,
            socket,
            subscription,
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            shutdown_rx,
        };

        session.run().await;
    }
}
