use crate::domain::message::{DeliveryStatus, Message};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod memory;
pub mod postgres;

pub use memory::MemoryMessageStore;
pub use postgres::PgMessageStore;

/// Durable message collection keyed by message id.
///
/// Writes go through two atomic primitives only: `upsert` and `update_status`.
#[async_trait]
pub trait MessageStore: Debug + Send + Sync + 'static {
    /// Inserts the message, or replaces the stored record with the same id.
    async fn upsert(&self, message: &Message) -> Result<()>;

    /// Changes only the delivery status of an existing message. Returns whether it matched.
    async fn update_status(&self, message_id: &str, status: DeliveryStatus) -> Result<bool>;

    async fn find(&self, message_id: &str) -> Result<Option<Message>>;

    /// Every stored message, ordered by timestamp then id.
    async fn fetch_all(&self) -> Result<Vec<Message>>;

    /// Removes every message. Administrative only.
    async fn purge(&self) -> Result<u64>;

    /// Verifies the backing store is reachable.
    async fn ping(&self) -> Result<()>;
}
