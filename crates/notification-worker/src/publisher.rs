//! 延迟投递
//!
//! 计算投递延迟并把分发消息发布到延迟队列，队列在到期前不会交给 worker。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notifier_shared::delay_queue::DelayQueue;
use notifier_shared::dlq::DeadLetterMessage;
use notifier_shared::error::NotifierError;
use notifier_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::info;

use crate::error::Result;
use crate::models::{DispatchMessage, Notification};

/// 投递延迟，已过期的时间点立即投递
pub fn compute_delay(scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (scheduled_at - now).to_std().unwrap_or(Duration::ZERO)
}

/// 延迟调度器
#[derive(Clone)]
pub struct DelayScheduler {
    queue: Arc<dyn DelayQueue>,
    retry_policy: RetryPolicy,
}

impl DelayScheduler {
    pub fn new(queue: Arc<dyn DelayQueue>, retry_policy: RetryPolicy) -> Self {
        Self {
            queue,
            retry_policy,
        }
    }

    /// 声明主队列与死信队列，启动时调用一次
    pub async fn declare_topology(&self) -> Result<()> {
        self.queue.declare_topology().await?;
        Ok(())
    }

    /// 查看死信队列（只读）
    pub async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterMessage>> {
        Ok(self.queue.dead_letters(limit).await?)
    }

    /// 发布通知，按重试策略重试，耗尽后返回最后一次错误
    pub async fn publish(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::to_string(&DispatchMessage::from(notification))
            .map_err(NotifierError::from)?;
        let delay = compute_delay(notification.scheduled_at, Utc::now());
        let message_id = notification.id.to_string();

        retry_with_policy(
            &self.retry_policy,
            "delay_scheduler.publish",
            NotifierError::is_retryable,
            || self.queue.publish(&message_id, &payload, delay),
        )
        .await?;

        info!(
            notification_id = %notification.id,
            delay_ms = delay.as_millis() as u64,
            "通知已发布到延迟队列"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewNotification, NotificationChannel};
    use crate::test_utils::FlakyQueue;
    use notifier_shared::delay_queue::InMemoryDelayQueue;
    use notifier_shared::test_utils::{fast_retry_policy, test_topology};

    fn notification_at(scheduled_at: DateTime<Utc>) -> Notification {
        Notification::new(NewNotification {
            message: "hello".to_string(),
            scheduled_at,
            channel: NotificationChannel::Email,
            recipient: "a@b.c".to_string(),
        })
    }

    #[test]
    fn test_delay_clamps_to_zero() {
        let now = Utc::now();
        assert_eq!(compute_delay(now - chrono::Duration::hours(1), now), Duration::ZERO);
        assert_eq!(compute_delay(now, now), Duration::ZERO);
        assert_eq!(
            compute_delay(now + chrono::Duration::seconds(90), now),
            Duration::from_secs(90)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_defers_visibility() {
        let queue = InMemoryDelayQueue::new(test_topology());
        let scheduler = DelayScheduler::new(Arc::new(queue.clone()), fast_retry_policy(3));
        let notification = notification_at(Utc::now() + chrono::Duration::seconds(60));

        scheduler.publish(&notification).await.unwrap();
        assert!(queue.poll(10).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        let deliveries = queue.poll(10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].message_id, notification.id.to_string());

        let message: DispatchMessage = serde_json::from_str(&deliveries[0].payload).unwrap();
        assert_eq!(message, DispatchMessage::from(&notification));
    }

    #[tokio::test]
    async fn test_past_schedule_is_immediately_visible() {
        let queue = InMemoryDelayQueue::new(test_topology());
        let scheduler = DelayScheduler::new(Arc::new(queue.clone()), fast_retry_policy(3));

        scheduler
            .publish(&notification_at(Utc::now() - chrono::Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(queue.poll(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_retries_then_succeeds() {
        let queue = Arc::new(FlakyQueue::failing_first(2));
        let scheduler = DelayScheduler::new(queue.clone(), fast_retry_policy(3));

        scheduler
            .publish(&notification_at(Utc::now()))
            .await
            .unwrap();
        assert_eq!(queue.publish_attempts(), 3);
    }

    #[tokio::test]
    async fn test_publish_error_surfaces_after_exhausting_retries() {
        let queue = Arc::new(FlakyQueue::failing_first(u32::MAX));
        let scheduler = DelayScheduler::new(queue.clone(), fast_retry_policy(3));

        let result = scheduler.publish(&notification_at(Utc::now())).await;
        assert!(result.is_err());
        assert_eq!(queue.publish_attempts(), 3);
    }
}
