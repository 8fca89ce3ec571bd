//! 通知服务
//!
//! 对外暴露 schedule / cancel / status 三个操作。
//! 创建流程不是原子的：数据库 -> 缓存 -> 延迟队列依次写入，任一步失败后不回滚前序写入。

use std::sync::Arc;

use notifier_shared::dlq::DeadLetterMessage;
use notifier_shared::observability::metrics;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::models::{NewNotification, Notification, NotificationStatus};
use crate::publisher::DelayScheduler;
use crate::repository::NotificationStore;
use crate::resolver::StatusResolver;
use crate::sender::SenderRegistry;
use crate::status_cache::StatusCache;

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    cache: Arc<dyn StatusCache>,
    resolver: StatusResolver,
    scheduler: DelayScheduler,
    senders: SenderRegistry,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        cache: Arc<dyn StatusCache>,
        scheduler: DelayScheduler,
        senders: SenderRegistry,
    ) -> Self {
        Self {
            resolver: StatusResolver::new(cache.clone(), store.clone()),
            store,
            cache,
            scheduler,
            senders,
        }
    }

    /// 创建通知并投递到延迟队列
    ///
    /// 渠道未注册、内容为空时在任何写入之前拒绝。缓存写入失败只记日志；
    /// 发布失败时把记录标记为 failed，避免遗留一条永远不会被投递的 scheduled 记录。
    pub async fn schedule(&self, input: NewNotification) -> Result<Notification> {
        if input.message.trim().is_empty() {
            return Err(NotificationError::Validation("message 不能为空".to_string()));
        }
        if input.recipient.trim().is_empty() {
            return Err(NotificationError::Validation("recipient 不能为空".to_string()));
        }
        self.senders.ensure_supported(input.channel)?;

        let notification = Notification::new(input);
        self.store.create(&notification).await?;

        if let Err(e) = self.cache.set(notification.id, notification.status).await {
            warn!(notification_id = %notification.id, error = %e, "写入状态缓存失败，继续创建");
        }

        if let Err(e) = self.scheduler.publish(&notification).await {
            error!(notification_id = %notification.id, error = %e, "发布到延迟队列失败，标记为 failed");
            self.mark_failed(notification.id).await;
            return Err(e);
        }

        metrics::record_scheduled(notification.channel.as_str());
        info!(
            notification_id = %notification.id,
            channel = %notification.channel,
            scheduled_at = %notification.scheduled_at,
            "通知已创建"
        );
        Ok(notification)
    }

    /// 取消通知
    ///
    /// 以数据库为准判断当前状态：已取消的重复取消视为成功，已发送/已失败的拒绝。
    /// 缓存写入失败时返回错误：缓存中残留的 scheduled 会让 worker 继续发送，
    /// 调用方重试取消即可修复缓存。
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        let current = self.store.get_status(id).await?;

        if current != NotificationStatus::Canceled {
            if !current.can_transition_to(NotificationStatus::Canceled) {
                return Err(NotificationError::InvalidTransition {
                    id,
                    from: current,
                    to: NotificationStatus::Canceled,
                });
            }
            self.store.set_status(id, NotificationStatus::Canceled).await?;
        }

        if let Err(e) = self.cache.set(id, NotificationStatus::Canceled).await {
            error!(notification_id = %id, error = %e, "取消后写入状态缓存失败");
            return Err(e);
        }

        info!(notification_id = %id, "通知已取消");
        Ok(())
    }

    /// 查询状态（缓存优先，数据库兜底）
    pub async fn status(&self, id: Uuid) -> Result<NotificationStatus> {
        self.resolver.resolve(id).await
    }

    /// 查看死信
    pub async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterMessage>> {
        self.scheduler.dead_letters(limit).await
    }

    async fn mark_failed(&self, id: Uuid) {
        if let Err(e) = self.store.set_status(id, NotificationStatus::Failed).await {
            error!(notification_id = %id, error = %e, "标记 failed 失败");
        }
        if let Err(e) = self.cache.set(id, NotificationStatus::Failed).await {
            warn!(notification_id = %id, error = %e, "写入 failed 状态缓存失败");
        }
    }
}
