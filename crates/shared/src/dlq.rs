//! 死信消息
//!
//! 延迟队列在投递次数耗尽、或消息本身无法解析时，把消息转入死信队列（DLQ）。
//! 核心流程不消费 DLQ，只提供只读查询，由运维人工处理。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 投递次数耗尽
pub const REASON_MAX_DELIVERIES: &str = "max_deliveries_exceeded";

// ---------------------------------------------------------------------------
// DeadLetterMessage — 死信消息信封
// ---------------------------------------------------------------------------

/// 死信消息信封
///
/// 包装原始消息，附加失败原因与投递次数，便于排查。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    /// 原始消息 ID（通知 ID）
    pub message_id: String,
    /// 来源队列
    pub source_queue: String,
    /// 原始消息内容
    pub payload: String,
    /// 进入死信的原因
    pub reason: String,
    /// 已投递次数
    pub delivery_count: u32,
    /// 进入死信的时间
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterMessage {
    pub fn new(
        message_id: impl Into<String>,
        source_queue: impl Into<String>,
        payload: impl Into<String>,
        reason: impl Into<String>,
        delivery_count: u32,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            source_queue: source_queue.into(),
            payload: payload.into(),
            reason: reason.into(),
            delivery_count,
            dead_lettered_at: Utc::now(),
        }
    }

    /// 是否因投递次数耗尽而进入死信
    pub fn is_delivery_exhausted(&self) -> bool {
        self.reason == REASON_MAX_DELIVERIES
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
