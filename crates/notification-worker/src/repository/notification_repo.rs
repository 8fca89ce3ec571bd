//! 通知仓储（PostgreSQL）

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::NotificationStore;
use crate::error::{NotificationError, Result};
use crate::models::{Notification, NotificationStatus};

pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, message, scheduled_at, channel, recipient, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.message)
        .bind(notification.scheduled_at)
        .bind(notification.channel)
        .bind(&notification.recipient)
        .bind(notification.status)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_status(&self, id: Uuid) -> Result<NotificationStatus> {
        let status = sqlx::query_scalar::<_, NotificationStatus>(
            r#"
            SELECT status FROM notifications WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        status.ok_or(NotificationError::NotFound(id))
    }

    async fn set_status(&self, id: Uuid, status: NotificationStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotificationError::NotFound(id));
        }
        Ok(())
    }
}
