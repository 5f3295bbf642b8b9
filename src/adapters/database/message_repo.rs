use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{DeliveryStatus, Message};
use crate::error::Result;
use sqlx::PgConnection;
use sqlx::types::Json;

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Inserts a message or replaces every non-identity column of the existing row.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the statement fails.
    #[tracing::instrument(level = "debug", skip(self, conn, message), fields(message_id = %message.id))]
    pub(crate) async fn upsert(&self, conn: &mut PgConnection, message: &Message) -> Result<()> {
        let (kind, content) = message.content.clone().into_parts();

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, display_name, sender, sent_at, kind, content, delivery_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                conversation_id = EXCLUDED.conversation_id,
                display_name = EXCLUDED.display_name,
                sender = EXCLUDED.sender,
                sent_at = EXCLUDED.sent_at,
                kind = EXCLUDED.kind,
                content = EXCLUDED.content,
                delivery_status = EXCLUDED.delivery_status,
                updated_at = NOW()
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.display_name)
        .bind(&message.from)
        .bind(message.timestamp)
        .bind(kind)
        .bind(Json(content))
        .bind(message.delivery_status.as_str())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Sets the delivery status of an existing message.
    ///
    /// Returns `false` when no message has the given id.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the statement fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn update_status(
        &self,
        conn: &mut PgConnection,
        message_id: &str,
        status: DeliveryStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE messages SET delivery_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(message_id)
            .bind(status.as_str())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetches every message in timestamp order.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn fetch_all(&self, conn: &mut PgConnection) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, display_name, sender, sent_at, kind, content, delivery_status
            FROM messages
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Fetches a single message by id.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, message_id: &str) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, display_name, sender, sent_at, kind, content, delivery_status
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Deletes every message.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete_all(&self, conn: &mut PgConnection) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages").execute(conn).await?;
        Ok(result.rows_affected())
    }
}
