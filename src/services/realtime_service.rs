use crate::config::RealtimeConfig;
use crate::domain::event::RealtimeEvent;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::RecvError;

#[derive(Clone, Debug)]
struct Metrics {
    published_total: Counter<u64>,
    subscribers: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("wa-relay");
        Self {
            published_total: meter
                .u64_counter("wa_relay_events_published_total")
                .with_description("Total real-time events published")
                .build(),
            subscribers: meter
                .i64_up_down_counter("wa_relay_realtime_subscribers")
                .with_description("Number of live real-time subscriptions")
                .build(),
        }
    }
}

/// Single-topic fan-out to every connected client.
///
/// Publishing never waits on subscribers. A subscriber only sees events published
/// while its [`Subscription`] is alive.
#[derive(Clone, Debug)]
pub struct RealtimeService {
    tx: broadcast::Sender<Arc<RealtimeEvent>>,
    metrics: Metrics,
}

impl RealtimeService {
    #[must_use]
    pub fn new(config: &RealtimeConfig) -> Self {
        let (tx, _rx) = broadcast::channel(config.channel_capacity.max(1));
        Self { tx, metrics: Metrics::new() }
    }

    /// Publishes an event and returns how many subscribers it was queued for.
    #[tracing::instrument(level = "debug", skip(self, event), fields(event = event.name()))]
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        let name = event.name();
        self.metrics.published_total.add(1, &[KeyValue::new("event", name)]);

        // An error only means nobody is subscribed.
        self.tx.send(Arc::new(event)).unwrap_or_default()
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.metrics.subscribers.add(1, &[]);
        Subscription { rx: self.tx.subscribe(), metrics: self.metrics.clone() }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Arc<RealtimeEvent>>,
    metrics: Metrics,
}

impl Subscription {
    /// Waits for the next event.
    ///
    /// # Errors
    /// Returns `RecvError::Lagged` when events were dropped for this subscriber and
    /// `RecvError::Closed` when the service is gone.
    pub async fn recv(&mut self) -> Result<Arc<RealtimeEvent>, RecvError> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.metrics.subscribers.add(-1, &[]);
    }
}
