use crate::adapters::store::MessageStore;
use crate::domain::conversation::{Conversation, project};
use crate::error::Result;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ConversationService {
    store: Arc<dyn MessageStore>,
}

impl ConversationService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Rebuilds the conversation list from every stored message.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the scan fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(message_count = tracing::field::Empty))]
    pub async fn list(&self) -> Result<Vec<Conversation>> {
        let messages = self.store.fetch_all().await?;
        tracing::Span::current().record("message_count", messages.len());
        Ok(project(messages))
    }
}
