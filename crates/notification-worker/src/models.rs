//! 通知领域模型
//!
//! 枚举同时支持数据库（sqlx）和 JSON（serde）序列化

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NotificationError;

/// 通知状态
///
/// 只允许 scheduled -> {sent, failed, canceled}，终态之间不再流转
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum NotificationStatus {
    /// 已排期，等待投递
    #[default]
    Scheduled,
    /// 已发送
    Sent,
    /// 发送失败（重试耗尽）
    Failed,
    /// 已取消
    Canceled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// 状态机允许的流转
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        matches!(
            (self, next),
            (
                Self::Scheduled,
                Self::Sent | Self::Failed | Self::Canceled
            )
        )
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(NotificationError::Validation(format!(
                "未知的通知状态: {other}"
            ))),
        }
    }
}

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Telegram,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Telegram => "telegram",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "telegram" => Ok(Self::Telegram),
            other => Err(NotificationError::Validation(format!(
                "未知的通知渠道: {other}"
            ))),
        }
    }
}

/// 通知记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 已通过校验的创建请求
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub channel: NotificationChannel,
    pub recipient: String,
}

impl Notification {
    /// 分配 ID，初始状态为 scheduled
    pub fn new(input: NewNotification) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            message: input.message,
            scheduled_at: input.scheduled_at,
            channel: input.channel,
            recipient: input.recipient,
            status: NotificationStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 延迟队列中的消息体
///
/// 只携带分发所需字段，状态在分发时重新查询
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMessage {
    pub id: Uuid,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub channel: NotificationChannel,
    pub recipient: String,
}

impl From<&Notification> for DispatchMessage {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            message: n.message.clone(),
            scheduled_at: n.scheduled_at,
            channel: n.channel,
            recipient: n.recipient.clone(),
        }
    }
}
