use crate::adapters::database::DbPool;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::store::MessageStore;
use crate::domain::message::{DeliveryStatus, Message};
use crate::error::Result;
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct PgMessageStore {
    pool: DbPool,
    repo: MessageRepository,
}

impl PgMessageStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool, repo: MessageRepository::new() }
    }

    #[must_use]
    pub const fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn upsert(&self, message: &Message) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.repo.upsert(&mut conn, message).await
    }

    async fn update_status(&self, message_id: &str, status: DeliveryStatus) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        self.repo.update_status(&mut conn, message_id, status).await
    }

    async fn find(&self, message_id: &str) -> Result<Option<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.find_by_id(&mut conn, message_id).await
    }

    async fn fetch_all(&self) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.fetch_all(&mut conn).await
    }

    async fn purge(&self) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.repo.delete_all(&mut conn).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
