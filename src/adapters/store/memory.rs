use crate::adapters::store::MessageStore;
use crate::domain::message::{DeliveryStatus, Message};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Process-local store used when no database is configured.
#[derive(Clone, Debug, Default)]
pub struct MemoryMessageStore {
    messages: Arc<DashMap<String, Message>>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn upsert(&self, message: &Message) -> Result<()> {
        self.messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn update_status(&self, message_id: &str, status: DeliveryStatus) -> Result<bool> {
        // The shard lock is held for the read-modify-write.
        match self.messages.get_mut(message_id) {
            Some(mut entry) => {
                entry.delivery_status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find(&self, message_id: &str) -> Result<Option<Message>> {
        Ok(self.messages.get(message_id).map(|entry| entry.value().clone()))
    }

    async fn fetch_all(&self) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self.messages.iter().map(|entry| entry.value().clone()).collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn purge(&self) -> Result<u64> {
        let removed = self.messages.len() as u64;
        self.messages.clear();
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
