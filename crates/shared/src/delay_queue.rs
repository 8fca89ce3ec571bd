//! 延迟队列
//!
//! 消息发布时携带延迟，只有到达可见时间后才能被拉取。投递次数超过上限的消息转入死信队列。
//!
//! # 租约
//! - 被领取的消息在 `lease`（`queue.lease_seconds`，默认 60 秒）内对其他消费者不可见。
//! - 领取方在 ack 之前通过 [`DelayQueue::touch`] 续租，每次把可见时间推迟到 now + lease。
//!   [`LeaseKeeper`] 在持有期间每隔 lease/3 自动续租，worker 池对缓冲中和处理中的消息都持有一个。
//! - 租约到期仍未续租（进程崩溃、续租连续失败）的消息重新可见，投递次数加一后再次投递。
//! - ack 或转入死信之后续租不再生效，消息不会被重新加入。
//!
//! # 实现
//! - **RedisDelayQueue**: 生产用（ZSET 按可见时间排序 + Lua 原子领取）
//! - **InMemoryDelayQueue**: 测试与本地开发用，基于 tokio 时钟

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Script};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::QueueConfig;
use crate::dlq::{DeadLetterMessage, REASON_MAX_DELIVERIES};
use crate::error::{NotifierError, Result};
use crate::observability::metrics;

// ---------------------------------------------------------------------------
// 拓扑与投递
// ---------------------------------------------------------------------------

/// 队列拓扑：主队列及其死信队列
#[derive(Debug, Clone, PartialEq)]
pub struct QueueTopology {
    pub queue: String,
    pub dead_letter_queue: String,
    /// 领取后的可见性租约
    pub lease: Duration,
    /// 最大投递次数
    pub max_deliveries: u32,
}

impl From<&QueueConfig> for QueueTopology {
    fn from(config: &QueueConfig) -> Self {
        Self {
            queue: config.queue.clone(),
            dead_letter_queue: config.dead_letter_queue.clone(),
            lease: config.lease(),
            max_deliveries: config.max_deliveries.max(1),
        }
    }
}

/// 一次投递
///
/// ack 之前消息仍归队列所有，租约到期后会再次投递。
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: String,
    pub payload: String,
    /// 含本次在内的投递次数
    pub delivery_count: u32,
}

/// 延迟队列抽象
#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// 声明主队列与死信队列的绑定（幂等）
    async fn declare_topology(&self) -> Result<()>;

    /// 发布消息，`delay` 之后才可见
    ///
    /// 同一 message_id 重复发布会覆盖之前的内容与可见时间。
    async fn publish(&self, message_id: &str, payload: &str, delay: Duration) -> Result<()>;

    /// 领取后的可见性租约
    fn lease(&self) -> Duration;

    /// 拉取最多 `max` 条已到期的消息，不阻塞
    async fn poll(&self, max: usize) -> Result<Vec<Delivery>>;

    /// 续租：把仍未 ack 的消息的可见时间推迟到 now + lease
    ///
    /// 消息已被 ack 或转入死信时什么也不做。
    async fn touch(&self, delivery: &Delivery) -> Result<()>;

    /// 确认消息已处理，从队列移除
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// 把消息转入死信队列
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()>;

    /// 查看死信（只读，不会重新发布）
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterMessage>>;
}

/// 租约续期
///
/// 持有期间每隔 lease/3 对投递调用一次 `touch`，drop 时停止。
pub struct LeaseKeeper {
    task: JoinHandle<()>,
}

impl LeaseKeeper {
    const MIN_PERIOD: Duration = Duration::from_millis(100);

    pub fn start(queue: Arc<dyn DelayQueue>, delivery: Delivery) -> Self {
        let period = (queue.lease() / 3).max(Self::MIN_PERIOD);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = queue.touch(&delivery).await {
                    warn!(message_id = %delivery.message_id, error = %e, "续租失败");
                }
            }
        });
        Self { task }
    }
}

impl Drop for LeaseKeeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// RedisDelayQueue
// ---------------------------------------------------------------------------

/// 原子领取到期消息
///
/// KEYS[1]=delayed ZSET, KEYS[2]=payload HASH, KEYS[3]=投递次数 HASH
/// ARGV[1]=now_ms, ARGV[2]=lease_ms, ARGV[3]=max
/// 返回平铺的 [id, payload, count, ...]
const CLAIM_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[3]))
local result = {}
local visible_at = tonumber(ARGV[1]) + tonumber(ARGV[2])
for _, id in ipairs(ids) do
  local payload = redis.call('HGET', KEYS[2], id)
  if payload then
    redis.call('ZADD', KEYS[1], visible_at, id)
    local count = redis.call('HINCRBY', KEYS[3], id, 1)
    table.insert(result, id)
    table.insert(result, payload)
    table.insert(result, tostring(count))
  else
    redis.call('ZREM', KEYS[1], id)
    redis.call('HDEL', KEYS[3], id)
  end
end
return result
"#;

/// 基于 Redis 的延迟队列
///
/// Key 布局（prefix 默认 `notifier`）：
/// - `{prefix}:{queue}:delayed`    ZSET，score 为可见时间（毫秒时间戳）
/// - `{prefix}:{queue}:payloads`   HASH，message_id -> payload
/// - `{prefix}:{queue}:deliveries` HASH，message_id -> 投递次数
/// - `{prefix}:{dlq}:messages`     LIST，DeadLetterMessage JSON
/// - `{prefix}:topology`           HASH，queue -> dlq
pub struct RedisDelayQueue {
    cache: Cache,
    key_prefix: String,
    topology: QueueTopology,
    claim_script: Script,
}

impl RedisDelayQueue {
    pub fn new(cache: Cache, config: &QueueConfig) -> Self {
        Self {
            cache,
            key_prefix: config.key_prefix.clone(),
            topology: QueueTopology::from(config),
            claim_script: Script::new(CLAIM_SCRIPT),
        }
    }

    fn delayed_key(&self) -> String {
        format!("{}:{}:delayed", self.key_prefix, self.topology.queue)
    }

    fn payloads_key(&self) -> String {
        format!("{}:{}:payloads", self.key_prefix, self.topology.queue)
    }

    fn deliveries_key(&self) -> String {
        format!("{}:{}:deliveries", self.key_prefix, self.topology.queue)
    }

    fn dead_letter_key(&self) -> String {
        format!(
            "{}:{}:messages",
            self.key_prefix, self.topology.dead_letter_queue
        )
    }

    fn topology_key(&self) -> String {
        format!("{}:topology", self.key_prefix)
    }

    /// 把脚本返回的平铺数组还原为投递列表
    fn parse_claimed(raw: Vec<String>) -> Result<Vec<Delivery>> {
        if raw.len() % 3 != 0 {
            return Err(NotifierError::Queue(format!(
                "领取脚本返回了非法长度: {}",
                raw.len()
            )));
        }

        raw.chunks_exact(3)
            .map(|chunk| {
                let delivery_count = chunk[2].parse::<u32>().map_err(|e| {
                    NotifierError::Queue(format!("非法投递次数 {}: {}", chunk[2], e))
                })?;
                Ok(Delivery {
                    message_id: chunk[0].clone(),
                    payload: chunk[1].clone(),
                    delivery_count,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DelayQueue for RedisDelayQueue {
    async fn declare_topology(&self) -> Result<()> {
        let mut conn = self.cache.connection().await?;
        let key = self.topology_key();

        let _: bool = conn
            .hset_nx(&key, &self.topology.queue, &self.topology.dead_letter_queue)
            .await?;
        let existing: Option<String> = conn.hget(&key, &self.topology.queue).await?;

        match existing {
            Some(dlq) if dlq != self.topology.dead_letter_queue => {
                Err(NotifierError::TopologyConflict {
                    queue: self.topology.queue.clone(),
                    existing: dlq,
                    requested: self.topology.dead_letter_queue.clone(),
                })
            }
            _ => {
                info!(
                    queue = %self.topology.queue,
                    dead_letter_queue = %self.topology.dead_letter_queue,
                    "延迟队列拓扑已声明"
                );
                Ok(())
            }
        }
    }

    async fn publish(&self, message_id: &str, payload: &str, delay: Duration) -> Result<()> {
        let visible_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.cache.connection().await?;

        redis::pipe()
            .atomic()
            .hset(self.payloads_key(), message_id, payload)
            .ignore()
            .hdel(self.deliveries_key(), message_id)
            .ignore()
            .zadd(self.delayed_key(), message_id, visible_at)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(message_id, delay_ms = delay.as_millis() as u64, "消息已发布到延迟队列");
        Ok(())
    }

    fn lease(&self) -> Duration {
        self.topology.lease
    }

    async fn poll(&self, max: usize) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.cache.connection().await?;
        let raw: Vec<String> = self
            .claim_script
            .key(self.delayed_key())
            .key(self.payloads_key())
            .key(self.deliveries_key())
            .arg(Utc::now().timestamp_millis())
            .arg(self.topology.lease.as_millis() as u64)
            .arg(max)
            .invoke_async(&mut conn)
            .await?;

        let mut deliverable = Vec::new();
        for delivery in Self::parse_claimed(raw)? {
            if delivery.delivery_count > self.topology.max_deliveries {
                self.dead_letter(&delivery, REASON_MAX_DELIVERIES).await?;
            } else {
                deliverable.push(delivery);
            }
        }
        Ok(deliverable)
    }

    async fn touch(&self, delivery: &Delivery) -> Result<()> {
        let visible_at =
            Utc::now().timestamp_millis() + self.topology.lease.as_millis() as i64;
        let mut conn = self.cache.connection().await?;

        // XX: 已 ack 的消息不在 ZSET 中，不会被重新加入
        redis::cmd("ZADD")
            .arg(self.delayed_key())
            .arg("XX")
            .arg(visible_at)
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut conn = self.cache.connection().await?;

        redis::pipe()
            .atomic()
            .zrem(self.delayed_key(), &delivery.message_id)
            .ignore()
            .hdel(self.payloads_key(), &delivery.message_id)
            .ignore()
            .hdel(self.deliveries_key(), &delivery.message_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let message = DeadLetterMessage::new(
            delivery.message_id.clone(),
            self.topology.queue.clone(),
            delivery.payload.clone(),
            reason,
            delivery.delivery_count,
        );
        let serialized = serde_json::to_string(&message)?;
        let mut conn = self.cache.connection().await?;

        redis::pipe()
            .atomic()
            .rpush(self.dead_letter_key(), serialized)
            .ignore()
            .zrem(self.delayed_key(), &delivery.message_id)
            .ignore()
            .hdel(self.payloads_key(), &delivery.message_id)
            .ignore()
            .hdel(self.deliveries_key(), &delivery.message_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        metrics::record_dead_lettered(&self.topology.queue, reason);
        warn!(
            message_id = %delivery.message_id,
            delivery_count = delivery.delivery_count,
            reason,
            "消息已转入死信队列"
        );
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterMessage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.cache.connection().await?;
        let raw: Vec<String> = conn
            .lrange(self.dead_letter_key(), 0, limit as isize - 1)
            .await?;

        raw.iter()
            .map(|item| serde_json::from_str(item).map_err(NotifierError::from))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// InMemoryDelayQueue
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PendingEntry {
    payload: String,
    visible_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct InMemoryState {
    pending: HashMap<String, PendingEntry>,
    dead: Vec<DeadLetterMessage>,
    declared: bool,
}

/// 内存延迟队列
///
/// 时间取自 tokio 时钟，`#[tokio::test(start_paused = true)]` 下可以快进。
#[derive(Clone)]
pub struct InMemoryDelayQueue {
    topology: QueueTopology,
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryDelayQueue {
    pub fn new(topology: QueueTopology) -> Self {
        Self {
            topology,
            state: Arc::new(Mutex::new(InMemoryState::default())),
        }
    }

    /// 尚未 ack 的消息数（含未到期与租约中的）
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// 是否已声明拓扑
    pub async fn is_declared(&self) -> bool {
        self.state.lock().await.declared
    }

    fn dead_letter_entry(
        &self,
        message_id: &str,
        entry: &PendingEntry,
        reason: &str,
    ) -> DeadLetterMessage {
        DeadLetterMessage::new(
            message_id,
            self.topology.queue.clone(),
            entry.payload.clone(),
            reason,
            entry.deliveries,
        )
    }
}

#[async_trait]
impl DelayQueue for InMemoryDelayQueue {
    async fn declare_topology(&self) -> Result<()> {
        self.state.lock().await.declared = true;
        Ok(())
    }

    async fn publish(&self, message_id: &str, payload: &str, delay: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        state.pending.insert(
            message_id.to_string(),
            PendingEntry {
                payload: payload.to_string(),
                visible_at: Instant::now() + delay,
                deliveries: 0,
            },
        );
        Ok(())
    }

    fn lease(&self) -> Duration {
        self.topology.lease
    }

    async fn poll(&self, max: usize) -> Result<Vec<Delivery>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let mut due: Vec<(String, Instant)> = state
            .pending
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(id, entry)| (id.clone(), entry.visible_at))
            .collect();
        due.sort_by_key(|(_, visible_at)| *visible_at);
        due.truncate(max);

        let mut deliveries = Vec::with_capacity(due.len());
        for (id, _) in due {
            let Some(entry) = state.pending.get_mut(&id) else {
                continue;
            };
            entry.deliveries += 1;
            entry.visible_at = now + self.topology.lease;

            if entry.deliveries > self.topology.max_deliveries {
                if let Some(entry) = state.pending.remove(&id) {
                    let dead = self.dead_letter_entry(&id, &entry, REASON_MAX_DELIVERIES);
                    state.dead.push(dead);
                }
                continue;
            }

            deliveries.push(Delivery {
                message_id: id,
                payload: entry.payload.clone(),
                delivery_count: entry.deliveries,
            });
        }

        Ok(deliveries)
    }

    async fn touch(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.pending.get_mut(&delivery.message_id) {
            entry.visible_at = Instant::now() + self.topology.lease;
        }
        Ok(())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.state.lock().await.pending.remove(&delivery.message_id);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.pending.remove(&delivery.message_id);
        state.dead.push(DeadLetterMessage::new(
            delivery.message_id.clone(),
            self.topology.queue.clone(),
            delivery.payload.clone(),
            reason,
            delivery.delivery_count,
        ));
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterMessage>> {
        let state = self.state.lock().await;
        Ok(state.dead.iter().take(limit).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> QueueTopology {
        QueueTopology {
            max_deliveries: 2,
            ..crate::test_utils::test_topology()
        }
    }

    #[test]
    fn test_topology_from_config() {
        let config = QueueConfig::default();
        let topology = QueueTopology::from(&config);
        assert_eq!(topology.queue, "notifications");
        assert_eq!(topology.dead_letter_queue, "notifications.dlq");
        assert_eq!(topology.lease, Duration::from_secs(60));
        assert_eq!(topology.max_deliveries, 5);
    }

    #[test]
    fn test_parse_claimed() {
        let raw = vec![
            "a".to_string(),
            "{}".to_string(),
            "1".to_string(),
            "b".to_string(),
            "{\"x\":1}".to_string(),
            "3".to_string(),
        ];
        let parsed = RedisDelayQueue::parse_claimed(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].message_id, "b");
        assert_eq!(parsed[1].delivery_count, 3);

        assert!(RedisDelayQueue::parse_claimed(vec!["a".to_string()]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_invisible_until_delay_elapses() {
        let queue = InMemoryDelayQueue::new(topology());
        queue
            .publish("m1", "payload", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(queue.poll(10).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(10)).await;
        let deliveries = queue.poll(10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].message_id, "m1");
        assert_eq!(deliveries[0].delivery_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacked_message_redelivered_after_lease() {
        let queue = InMemoryDelayQueue::new(topology());
        queue.publish("m1", "payload", Duration::ZERO).await.unwrap();

        assert_eq!(queue.poll(10).await.unwrap().len(), 1);
        // 租约期内不可见
        assert!(queue.poll(10).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(30)).await;
        let redelivered = queue.poll(10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].delivery_count, 2);

        queue.ack(&redelivered[0]).await.unwrap();
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_extends_lease_until_acked() {
        let queue = InMemoryDelayQueue::new(topology());
        queue.publish("m1", "payload", Duration::ZERO).await.unwrap();
        let delivery = queue.poll(10).await.unwrap().remove(0);

        tokio::time::advance(Duration::from_secs(20)).await;
        queue.touch(&delivery).await.unwrap();
        // 距离领取已超过 30s，但续租后仍不可见
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(queue.poll(10).await.unwrap().is_empty());

        queue.ack(&delivery).await.unwrap();
        // ack 之后续租不会把消息加回来
        queue.touch(&delivery).await.unwrap();
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_keeper_renews_until_dropped() {
        let queue = InMemoryDelayQueue::new(topology());
        queue.publish("m1", "payload", Duration::ZERO).await.unwrap();
        let delivery = queue.poll(10).await.unwrap().remove(0);

        let keeper = LeaseKeeper::start(Arc::new(queue.clone()), delivery);
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(queue.poll(10).await.unwrap().is_empty());

        // 停止续租后按租约到期重新投递
        drop(keeper);
        tokio::time::sleep(Duration::from_secs(31)).await;
        let redelivered = queue.poll(10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].delivery_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_message_moves_to_dead_letter() {
        let queue = InMemoryDelayQueue::new(topology());
        queue.publish("m1", "payload", Duration::ZERO).await.unwrap();

        // max_deliveries = 2，第三次领取时转入死信
        for _ in 0..2 {
            assert_eq!(queue.poll(10).await.unwrap().len(), 1);
            tokio::time::advance(Duration::from_secs(30)).await;
        }
        assert!(queue.poll(10).await.unwrap().is_empty());

        let dead = queue.dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message_id, "m1");
        assert!(dead[0].is_delivery_exhausted());
        assert_eq!(dead[0].delivery_count, 3);
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_respects_max_and_order() {
        let queue = InMemoryDelayQueue::new(topology());
        queue.publish("late", "p", Duration::from_secs(3)).await.unwrap();
        queue.publish("early", "p", Duration::from_secs(1)).await.unwrap();
        queue.publish("middle", "p", Duration::from_secs(2)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        let first = queue.poll(2).await.unwrap();
        let ids: Vec<_> = first.iter().map(|d| d.message_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "middle"]);

        let rest = queue.poll(2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].message_id, "late");
    }

    #[tokio::test]
    async fn test_explicit_dead_letter() {
        let queue = InMemoryDelayQueue::new(topology());
        queue.declare_topology().await.unwrap();
        assert!(queue.is_declared().await);

        queue.publish("m1", "not json", Duration::ZERO).await.unwrap();
        let delivery = queue.poll(1).await.unwrap().remove(0);
        queue.dead_letter(&delivery, "payload 解析失败").await.unwrap();

        let dead = queue.dead_letters(10).await.unwrap();
        assert_eq!(dead[0].payload, "not json");
        assert_eq!(dead[0].source_queue, "notifications");
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    #[ignore] // 需要 Redis 连接
    async fn test_redis_delay_queue_roundtrip() {
        use crate::test_utils::{test_queue_config, test_redis_config};

        let cache = Cache::new(&test_redis_config()).unwrap();
        let config = QueueConfig {
            lease_seconds: 1,
            max_deliveries: 1,
            ..test_queue_config()
        };
        let queue = RedisDelayQueue::new(cache, &config);
        queue.declare_topology().await.unwrap();
        // 重复声明是幂等的
        queue.declare_topology().await.unwrap();

        queue.publish("m1", "hello", Duration::ZERO).await.unwrap();
        let deliveries = queue.poll(10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].payload, "hello");

        // 续租推迟可见时间
        tokio::time::sleep(Duration::from_millis(600)).await;
        queue.touch(&deliveries[0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(queue.poll(10).await.unwrap().is_empty());

        // 不 ack，等待租约到期后超过投递上限进入死信
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(queue.poll(10).await.unwrap().is_empty());
        let dead = queue.dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].is_delivery_exhausted());
    }
}
