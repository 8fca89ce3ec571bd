//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Notification, NotificationStatus};

/// 通知持久化存储（状态的权威来源）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<()>;

    /// 记录不存在时返回 `NotificationError::NotFound`
    async fn get_status(&self, id: Uuid) -> Result<NotificationStatus>;

    /// 无条件覆盖状态，记录不存在时返回 `NotificationError::NotFound`
    async fn set_status(&self, id: Uuid, status: NotificationStatus) -> Result<()>;
}
