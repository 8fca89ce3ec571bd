//! 单条投递的分发处理
//!
//! 处理步骤：
//! 1. 解析消息体，无法解析的直接转入死信
//! 2. 重新解析当前状态（缓存优先，数据库兜底）
//! 3. 已取消或已是终态的消息直接 ack 丢弃
//! 4. 按重试策略调用渠道发送器，得到 sent / failed
//! 5. 回写数据库与缓存（尽力而为，失败只记日志），最后 ack

use std::sync::Arc;
use std::time::Instant;

use notifier_shared::delay_queue::{DelayQueue, Delivery};
use notifier_shared::observability::metrics;
use notifier_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::NotificationError;
use crate::models::{DispatchMessage, NotificationStatus};
use crate::repository::NotificationStore;
use crate::resolver::StatusResolver;
use crate::sender::SenderRegistry;
use crate::status_cache::StatusCache;

/// 单条投递的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 发送成功
    Sent,
    /// 重试耗尽仍失败
    Failed,
    /// 已被取消，未发送
    Canceled,
    /// 已是 sent/failed（重复投递），未发送
    AlreadyTerminal(NotificationStatus),
    /// 记录不存在，已丢弃
    NotFound,
    /// 消息体无法解析，已转入死信
    DeadLettered,
    /// 状态查询出错，未 ack，等待队列重新投递
    Deferred,
}

pub struct DispatchHandler {
    resolver: StatusResolver,
    store: Arc<dyn NotificationStore>,
    cache: Arc<dyn StatusCache>,
    senders: SenderRegistry,
    queue: Arc<dyn DelayQueue>,
    retry_policy: RetryPolicy,
}

impl DispatchHandler {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        cache: Arc<dyn StatusCache>,
        senders: SenderRegistry,
        queue: Arc<dyn DelayQueue>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            resolver: StatusResolver::new(cache.clone(), store.clone()),
            store,
            cache,
            senders,
            queue,
            retry_policy,
        }
    }

    pub async fn handle(&self, delivery: &Delivery) -> DispatchOutcome {
        let message: DispatchMessage = match serde_json::from_str(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    message_id = %delivery.message_id,
                    error = %e,
                    "分发消息解析失败，转入死信队列"
                );
                if let Err(e) = self
                    .queue
                    .dead_letter(delivery, &format!("payload 解析失败: {e}"))
                    .await
                {
                    error!(message_id = %delivery.message_id, error = %e, "转入死信队列失败");
                }
                return DispatchOutcome::DeadLettered;
            }
        };

        let status = match self.resolver.resolve(message.id).await {
            Ok(status) => status,
            Err(e) if e.is_not_found() => {
                warn!(notification_id = %message.id, "通知记录不存在，丢弃消息");
                metrics::record_skipped("not_found");
                self.ack(delivery).await;
                return DispatchOutcome::NotFound;
            }
            Err(e) => {
                // 不 ack，租约到期后重新投递，超过投递上限进入死信
                error!(
                    notification_id = %message.id,
                    delivery_count = delivery.delivery_count,
                    error = %e,
                    "查询通知状态失败，等待重新投递"
                );
                return DispatchOutcome::Deferred;
            }
        };

        match status {
            NotificationStatus::Canceled => {
                info!(notification_id = %message.id, "通知已取消，跳过发送");
                metrics::record_skipped("canceled");
                self.ack(delivery).await;
                return DispatchOutcome::Canceled;
            }
            NotificationStatus::Sent | NotificationStatus::Failed => {
                info!(notification_id = %message.id, status = %status, "通知已处理过，跳过重复投递");
                metrics::record_skipped("terminal");
                self.ack(delivery).await;
                return DispatchOutcome::AlreadyTerminal(status);
            }
            NotificationStatus::Scheduled => {}
        }

        let started = Instant::now();
        let send_result = retry_with_policy(
            &self.retry_policy,
            "dispatch.send",
            NotificationError::is_retryable,
            || {
                self.senders
                    .send(message.channel, &message.message, &message.recipient)
            },
        )
        .await;

        let (final_status, outcome) = match send_result {
            Ok(()) => {
                info!(
                    notification_id = %message.id,
                    channel = %message.channel,
                    "通知发送成功"
                );
                (NotificationStatus::Sent, DispatchOutcome::Sent)
            }
            Err(e) => {
                error!(
                    notification_id = %message.id,
                    channel = %message.channel,
                    error = %e,
                    "通知发送失败，重试已耗尽"
                );
                (NotificationStatus::Failed, DispatchOutcome::Failed)
            }
        };

        self.write_status(message.id, final_status).await;
        metrics::record_dispatch(
            message.channel.as_str(),
            final_status.as_str(),
            started.elapsed().as_secs_f64(),
        );
        self.ack(delivery).await;

        outcome
    }

    /// 回写最终状态，失败只记日志
    async fn write_status(&self, id: Uuid, status: NotificationStatus) {
        let stored = retry_with_policy(
            &self.retry_policy,
            "dispatch.store_status",
            NotificationError::is_retryable,
            || self.store.set_status(id, status),
        )
        .await;
        if let Err(e) = stored {
            error!(notification_id = %id, status = %status, error = %e, "回写数据库状态失败");
        }

        if let Err(e) = self.cache.set(id, status).await {
            error!(notification_id = %id, status = %status, error = %e, "回写缓存状态失败");
        }
    }

    async fn ack(&self, delivery: &Delivery) {
        // ack 失败时消息会在租约到期后重新投递，届时按终态跳过
        if let Err(e) = self.queue.ack(delivery).await {
            warn!(message_id = %delivery.message_id, error = %e, "确认消息失败");
        }
    }
}
