//! 测试工具模块
//!
//! 内存版的存储、缓存、发送器与队列，单元测试与集成测试共用。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use notifier_shared::config::{QueueConfig, WorkerConfig};
use notifier_shared::delay_queue::{DelayQueue, Delivery, InMemoryDelayQueue};
use notifier_shared::dlq::DeadLetterMessage;
use notifier_shared::error::{NotifierError, Result as SharedResult};
use notifier_shared::test_utils::{fast_retry_policy, test_topology};
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::handler::DispatchHandler;
use crate::models::{Notification, NotificationChannel, NotificationStatus};
use crate::publisher::DelayScheduler;
use crate::repository::NotificationStore;
use crate::sender::{ChannelSender, SenderRegistry};
use crate::service::NotificationService;
use crate::status_cache::StatusCache;
use crate::worker::DispatchWorkerPool;

// ==================== 存储 ====================

/// 内存通知存储
#[derive(Default)]
pub struct InMemoryNotificationStore {
    records: Mutex<HashMap<Uuid, Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status_of(&self, id: Uuid) -> Option<NotificationStatus> {
        self.records.lock().await.get(&id).map(|n| n.status)
    }

    /// 直接改写状态，模拟其他进程的写入
    pub async fn put(&self, id: Uuid, status: NotificationStatus) {
        if let Some(record) = self.records.lock().await.get_mut(&id) {
            record.status = status;
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.records.lock().await.keys().copied().collect()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, notification: &Notification) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get_status(&self, id: Uuid) -> Result<NotificationStatus> {
        self.status_of(id).await.ok_or(NotificationError::NotFound(id))
    }

    async fn set_status(&self, id: Uuid, status: NotificationStatus) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(NotificationError::NotFound(id))?;
        record.status = status;
        record.updated_at = chrono::Utc::now();
        Ok(())
    }
}

// ==================== 缓存 ====================

/// 内存状态缓存，可切换为读/写失败
#[derive(Default)]
pub struct InMemoryStatusCache {
    entries: Mutex<HashMap<Uuid, NotificationStatus>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status_of(&self, id: Uuid) -> Option<NotificationStatus> {
        self.entries.lock().await.get(&id).copied()
    }

    pub async fn put(&self, id: Uuid, status: NotificationStatus) {
        self.entries.lock().await.insert(id, status);
    }

    pub async fn remove(&self, id: Uuid) {
        self.entries.lock().await.remove(&id);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> NotificationError {
        NotifierError::ExternalService {
            service: "redis".to_string(),
            message: "cache unavailable".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl StatusCache for InMemoryStatusCache {
    async fn set(&self, id: Uuid, status: NotificationStatus) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.put(id, status).await;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationStatus>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.status_of(id).await)
    }
}

// ==================== 发送器 ====================

/// 记录所有发送内容
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// (message, recipient) 列表，按发送顺序
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(&self, message: &str, recipient: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((message.to_string(), recipient.to_string()));
        Ok(())
    }
}

/// 总是返回可重试错误
#[derive(Default)]
pub struct FailingSender {
    attempts: AtomicU32,
}

impl FailingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for FailingSender {
    async fn send(&self, _message: &str, _recipient: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotificationError::SendFailed {
            channel: NotificationChannel::Email,
            reason: "smtp unavailable".to_string(),
        })
    }
}

/// 每次发送需要先拿到一个放行许可，用于观察处理中途的行为
pub struct GatedSender {
    gate: Semaphore,
    started: AtomicU32,
    inner: RecordingSender,
}

impl GatedSender {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: AtomicU32::new(0),
            inner: RecordingSender::new(),
        }
    }

    /// 放行 n 次发送
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// 已进入发送（可能仍在等待放行）的次数
    pub fn started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }

    /// 轮询直到至少 n 次发送已开始
    pub async fn wait_started(&self, n: u32) {
        while self.started() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.inner.sent().await
    }
}

impl Default for GatedSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for GatedSender {
    async fn send(&self, message: &str, recipient: &str) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.map_err(|e| NotificationError::SendFailed {
            channel: NotificationChannel::Email,
            reason: e.to_string(),
        })?;
        permit.forget();
        self.inner.send(message, recipient).await
    }
}

// ==================== 队列 ====================

/// 前 n 次 publish 返回可重试错误，之后委托给内存队列
pub struct FlakyQueue {
    inner: InMemoryDelayQueue,
    failures_left: AtomicU32,
    publish_attempts: AtomicU32,
}

impl FlakyQueue {
    pub fn failing_first(n: u32) -> Self {
        Self {
            inner: InMemoryDelayQueue::new(test_topology()),
            failures_left: AtomicU32::new(n),
            publish_attempts: AtomicU32::new(0),
        }
    }

    pub fn publish_attempts(&self) -> u32 {
        self.publish_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DelayQueue for FlakyQueue {
    async fn declare_topology(&self) -> SharedResult<()> {
        self.inner.declare_topology().await
    }

    async fn publish(&self, message_id: &str, payload: &str, delay: Duration) -> SharedResult<()> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotifierError::Queue("broker unavailable".to_string()));
        }
        self.inner.publish(message_id, payload, delay).await
    }

    fn lease(&self) -> Duration {
        self.inner.lease()
    }

    async fn poll(&self, max: usize) -> SharedResult<Vec<Delivery>> {
        self.inner.poll(max).await
    }

    async fn touch(&self, delivery: &Delivery) -> SharedResult<()> {
        self.inner.touch(delivery).await
    }

    async fn ack(&self, delivery: &Delivery) -> SharedResult<()> {
        self.inner.ack(delivery).await
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> SharedResult<()> {
        self.inner.dead_letter(delivery, reason).await
    }

    async fn dead_letters(&self, limit: usize) -> SharedResult<Vec<DeadLetterMessage>> {
        self.inner.dead_letters(limit).await
    }
}

// ==================== 组装 ====================

/// 一套完全基于内存的依赖，email 渠道已注册
pub struct TestContext {
    pub queue: InMemoryDelayQueue,
    pub store: Arc<InMemoryNotificationStore>,
    pub cache: Arc<InMemoryStatusCache>,
    /// 默认注册的 email 发送器；`with_email_sender` 时不参与发送
    pub email: Arc<RecordingSender>,
    email_sender: Arc<dyn ChannelSender>,
    attempts: u32,
}

impl TestContext {
    /// `attempts` 为发送/发布的总尝试次数
    pub fn new(attempts: u32) -> Self {
        let email = Arc::new(RecordingSender::new());
        Self::build(attempts, email.clone(), email)
    }

    /// 使用自定义的 email 发送器
    pub fn with_email_sender(attempts: u32, sender: Arc<dyn ChannelSender>) -> Self {
        Self::build(attempts, Arc::new(RecordingSender::new()), sender)
    }

    fn build(attempts: u32, email: Arc<RecordingSender>, email_sender: Arc<dyn ChannelSender>) -> Self {
        Self {
            queue: InMemoryDelayQueue::new(test_topology()),
            store: Arc::new(InMemoryNotificationStore::new()),
            cache: Arc::new(InMemoryStatusCache::new()),
            email,
            email_sender,
            attempts,
        }
    }

    pub fn registry(&self) -> SenderRegistry {
        SenderRegistry::new().register(NotificationChannel::Email, self.email_sender.clone())
    }

    pub fn scheduler(&self) -> DelayScheduler {
        DelayScheduler::new(Arc::new(self.queue.clone()), fast_retry_policy(self.attempts))
    }

    pub fn service(&self) -> NotificationService {
        NotificationService::new(
            self.store.clone(),
            self.cache.clone(),
            self.scheduler(),
            self.registry(),
        )
    }

    pub fn handler(&self) -> DispatchHandler {
        DispatchHandler::new(
            self.store.clone(),
            self.cache.clone(),
            self.registry(),
            Arc::new(self.queue.clone()),
            fast_retry_policy(self.attempts),
        )
    }

    /// 使用内存队列的 worker 池，拉取间隔 10ms
    pub fn worker_pool(&self, worker_count: usize) -> DispatchWorkerPool {
        let worker_config = WorkerConfig {
            worker_count,
            ..WorkerConfig::default()
        };
        let queue_config = QueueConfig {
            poll_interval_ms: 10,
            ..QueueConfig::default()
        };
        DispatchWorkerPool::new(
            Arc::new(self.queue.clone()),
            Arc::new(self.handler()),
            &worker_config,
            &queue_config,
        )
    }

    /// 只写入存储，不写缓存也不入队
    pub async fn seed(&self, notification: &Notification) {
        self.store.records.lock().await.insert(notification.id, notification.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_queue_recovers_after_failures() {
        let queue = FlakyQueue::failing_first(1);
        assert!(queue.publish("m1", "p", Duration::ZERO).await.is_err());
        assert!(queue.publish("m1", "p", Duration::ZERO).await.is_ok());
        assert_eq!(queue.publish_attempts(), 2);
        assert_eq!(queue.poll(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gated_sender_blocks_until_released() {
        let sender = Arc::new(GatedSender::new());
        let task = {
            let sender = sender.clone();
            tokio::spawn(async move { sender.send("m", "r").await })
        };

        sender.wait_started(1).await;
        assert!(sender.sent().await.is_empty());

        sender.release(1);
        task.await.unwrap().unwrap();
        assert_eq!(sender.sent().await.len(), 1);
    }
}
