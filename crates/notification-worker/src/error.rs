//! 通知服务错误类型
//!
//! 区分"记录不存在"、"状态流转非法"、"渠道未注册"等业务错误与底层基础设施错误，
//! 便于上层决定重试、丢弃或直接返回给调用方。

use notifier_shared::error::NotifierError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NotificationChannel, NotificationStatus};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("通知不存在: {0}")]
    NotFound(Uuid),

    #[error("通知状态不允许变更: id={id}, {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: NotificationStatus,
        to: NotificationStatus,
    },

    #[error("渠道未注册发送器: {0}")]
    UnknownChannel(NotificationChannel),

    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("通知发送失败: 渠道={channel}, 原因={reason}")]
    SendFailed {
        channel: NotificationChannel,
        reason: String,
    },

    #[error(transparent)]
    Shared(#[from] NotifierError),
}

impl NotificationError {
    /// 瞬时故障可重试；业务错误重试也不会成功
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SendFailed { .. } => true,
            Self::Shared(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Shared(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for NotificationError {
    fn from(err: sqlx::Error) -> Self {
        Self::Shared(NotifierError::Database(err))
    }
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotificationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let send_err = NotificationError::SendFailed {
            channel: NotificationChannel::Email,
            reason: "网络超时".to_string(),
        };
        assert_eq!(send_err.to_string(), "通知发送失败: 渠道=email, 原因=网络超时");

        let id = Uuid::nil();
        let transition = NotificationError::InvalidTransition {
            id,
            from: NotificationStatus::Sent,
            to: NotificationStatus::Canceled,
        };
        assert_eq!(
            transition.to_string(),
            format!("通知状态不允许变更: id={id}, sent -> canceled")
        );

        let channel_err = NotificationError::UnknownChannel(NotificationChannel::Telegram);
        assert_eq!(channel_err.to_string(), "渠道未注册发送器: telegram");
    }

    #[test]
    fn test_retryable_classification() {
        let send_err = NotificationError::SendFailed {
            channel: NotificationChannel::Email,
            reason: "smtp 421".to_string(),
        };
        assert!(send_err.is_retryable());

        assert!(!NotificationError::NotFound(Uuid::nil()).is_retryable());
        assert!(!NotificationError::Validation("bad".into()).is_retryable());

        let db: NotificationError = sqlx::Error::PoolTimedOut.into();
        assert!(db.is_retryable());
    }

    #[test]
    fn test_not_found_through_shared() {
        let shared = NotificationError::Shared(NotifierError::notification_not_found("x"));
        assert!(shared.is_not_found());
        assert!(NotificationError::NotFound(Uuid::nil()).is_not_found());
        assert!(!NotificationError::Validation("x".into()).is_not_found());
    }
}
