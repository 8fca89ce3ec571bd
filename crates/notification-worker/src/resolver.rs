//! 状态解析（读路径）
//!
//! 先查缓存，未命中或缓存出错时回落到数据库。回落时不回填缓存，
//! 缓存命中的值原样返回，即使与数据库不一致。

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::NotificationStatus;
use crate::repository::NotificationStore;
use crate::status_cache::StatusCache;

#[derive(Clone)]
pub struct StatusResolver {
    cache: Arc<dyn StatusCache>,
    store: Arc<dyn NotificationStore>,
}

impl StatusResolver {
    pub fn new(cache: Arc<dyn StatusCache>, store: Arc<dyn NotificationStore>) -> Self {
        Self { cache, store }
    }

    /// 解析当前状态，数据库也不存在时返回 `NotificationError::NotFound`
    pub async fn resolve(&self, id: Uuid) -> Result<NotificationStatus> {
        match self.cache.get(id).await {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => debug!(notification_id = %id, "状态缓存未命中，回落到数据库"),
            Err(e) => warn!(notification_id = %id, error = %e, "读取状态缓存失败，回落到数据库"),
        }

        self.store.get_status(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::repository::MockNotificationStore;
    use crate::status_cache::MockStatusCache;
    use mockall::predicate::eq;
    use notifier_shared::error::NotifierError;

    #[tokio::test]
    async fn test_cache_hit_wins_over_store() {
        let id = Uuid::new_v4();
        let mut cache = MockStatusCache::new();
        cache
            .expect_get()
            .with(eq(id))
            .returning(|_| Ok(Some(NotificationStatus::Canceled)));

        // 缓存命中时不应访问数据库
        let mut store = MockNotificationStore::new();
        store.expect_get_status().never();

        let resolver = StatusResolver::new(Arc::new(cache), Arc::new(store));
        assert_eq!(
            resolver.resolve(id).await.unwrap(),
            NotificationStatus::Canceled
        );
    }

    #[tokio::test]
    async fn test_cache_miss_falls_back_to_store() {
        let id = Uuid::new_v4();
        let mut cache = MockStatusCache::new();
        cache.expect_get().returning(|_| Ok(None));
        // 回落时不回填缓存
        cache.expect_set().never();

        let mut store = MockNotificationStore::new();
        store
            .expect_get_status()
            .with(eq(id))
            .times(1)
            .returning(|_| Ok(NotificationStatus::Scheduled));

        let resolver = StatusResolver::new(Arc::new(cache), Arc::new(store));
        assert_eq!(
            resolver.resolve(id).await.unwrap(),
            NotificationStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_cache_error_falls_back_to_store() {
        let mut cache = MockStatusCache::new();
        cache
            .expect_get()
            .returning(|_| Err(NotifierError::Internal("redis down".into()).into()));

        let mut store = MockNotificationStore::new();
        store
            .expect_get_status()
            .returning(|_| Ok(NotificationStatus::Sent));

        let resolver = StatusResolver::new(Arc::new(cache), Arc::new(store));
        assert_eq!(
            resolver.resolve(Uuid::new_v4()).await.unwrap(),
            NotificationStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let mut cache = MockStatusCache::new();
        cache.expect_get().returning(|_| Ok(None));

        let mut store = MockNotificationStore::new();
        store
            .expect_get_status()
            .returning(|id| Err(NotificationError::NotFound(id)));

        let resolver = StatusResolver::new(Arc::new(cache), Arc::new(store));
        let err = resolver.resolve(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
