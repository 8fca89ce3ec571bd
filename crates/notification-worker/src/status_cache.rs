//! 通知状态缓存
//!
//! Redis 中保存状态的非权威副本，每次写状态时刷新，读取时优先命中。
//! 缓存可能为空或过期，读路径在未命中时回落到数据库。

use std::time::Duration;

use async_trait::async_trait;
use notifier_shared::cache::{Cache, CacheKey};
use notifier_shared::error::NotifierError;
use notifier_shared::retry::{RetryPolicy, retry_with_policy};
use uuid::Uuid;

use crate::error::Result;
use crate::models::NotificationStatus;

/// 状态缓存接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusCache: Send + Sync {
    /// 写入状态（实现自行负责重试）
    async fn set(&self, id: Uuid, status: NotificationStatus) -> Result<()>;

    /// 读取状态，未命中返回 None
    async fn get(&self, id: Uuid) -> Result<Option<NotificationStatus>>;
}

/// 基于 Redis 的状态缓存
pub struct RedisStatusCache {
    cache: Cache,
    ttl: Option<Duration>,
    retry_policy: RetryPolicy,
}

impl RedisStatusCache {
    pub fn new(cache: Cache, ttl: Option<Duration>, retry_policy: RetryPolicy) -> Self {
        Self {
            cache,
            ttl,
            retry_policy,
        }
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn set(&self, id: Uuid, status: NotificationStatus) -> Result<()> {
        let key = CacheKey::notification_status(&id.to_string());

        retry_with_policy(
            &self.retry_policy,
            "status_cache.set",
            NotifierError::is_retryable,
            || self.cache.set_raw(&key, status.as_str(), self.ttl),
        )
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationStatus>> {
        let key = CacheKey::notification_status(&id.to_string());

        match self.cache.get_raw(&key).await? {
            Some(raw) => Ok(Some(raw.parse()?)),
            None => Ok(None),
        }
    }
}
