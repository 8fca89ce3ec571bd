//! 请求/响应 DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

use super::error::{ApiError, ApiResult};
use crate::models::{NewNotification, NotificationChannel, NotificationStatus};

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn success_empty() -> ApiResponse<()> {
        ApiResponse {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: None,
        }
    }
}

/// 创建通知请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleNotificationRequest {
    #[validate(length(min = 1, max = 10000, message = "message 长度必须在1-10000个字符之间"))]
    pub message: String,
    /// RFC 3339 时间，例如 2025-01-01T09:00:00+08:00
    #[validate(length(min = 1, message = "scheduledAt 不能为空"))]
    pub scheduled_at: String,
    #[validate(length(min = 1, message = "channel 不能为空"))]
    pub channel: String,
    #[validate(length(min = 1, max = 320, message = "recipient 长度必须在1-320个字符之间"))]
    pub recipient: String,
}

impl ScheduleNotificationRequest {
    /// 校验并转换为领域输入，时间统一归一到 UTC
    pub fn into_new_notification(self) -> ApiResult<NewNotification> {
        self.validate()?;

        let channel: NotificationChannel = self
            .channel
            .parse()
            .map_err(|_| ApiError::Validation(format!("不支持的渠道: {}", self.channel)))?;

        let scheduled_at = DateTime::parse_from_rfc3339(self.scheduled_at.trim())
            .map_err(|e| {
                ApiError::Validation(format!("scheduledAt 必须是 RFC 3339 格式: {e}"))
            })?
            .with_timezone(&Utc);

        let recipient = self.recipient.trim().to_string();
        if channel == NotificationChannel::Email && !recipient.validate_email() {
            return Err(ApiError::Validation(format!("邮箱地址非法: {recipient}")));
        }

        Ok(NewNotification {
            message: self.message,
            scheduled_at,
            channel,
            recipient,
        })
    }
}

/// 创建成功后返回的 id
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledDto {
    pub id: Uuid,
    pub scheduled_at: DateTime<Utc>,
}

/// 状态查询响应
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDto {
    pub id: Uuid,
    pub status: NotificationStatus,
}

/// 死信查询参数
#[derive(Debug, Deserialize, Validate)]
pub struct DeadLetterQuery {
    #[validate(range(min = 1, max = 1000, message = "limit 必须在1-1000之间"))]
    pub limit: Option<usize>,
}

impl DeadLetterQuery {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

/// 解析路径中的 id
pub fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scheduled_at: &str, channel: &str, recipient: &str) -> ScheduleNotificationRequest {
        ScheduleNotificationRequest {
            message: "hello".to_string(),
            scheduled_at: scheduled_at.to_string(),
            channel: channel.to_string(),
            recipient: recipient.to_string(),
        }
    }

    #[test]
    fn test_scheduled_at_normalized_to_utc() {
        let input = request("2025-01-01T09:00:00+08:00", "email", "user@example.com")
            .into_new_notification()
            .unwrap();
        assert_eq!(input.scheduled_at.to_rfc3339(), "2025-01-01T01:00:00+00:00");
        assert_eq!(input.channel, NotificationChannel::Email);
    }

    #[test]
    fn test_non_rfc3339_rejected() {
        for raw in ["2025-01-01 09:00:00", "2025-01-01", "tomorrow"] {
            assert!(matches!(
                request(raw, "email", "user@example.com").into_new_notification(),
                Err(ApiError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_email_channel_requires_email_address() {
        assert!(matches!(
            request("2025-01-01T00:00:00Z", "email", "not-an-email").into_new_notification(),
            Err(ApiError::Validation(_))
        ));
        // 其他渠道不校验邮箱格式
        assert!(
            request("2025-01-01T00:00:00Z", "telegram", "@someone")
                .into_new_notification()
                .is_ok()
        );
    }

    #[test]
    fn test_unknown_channel_and_empty_fields_rejected() {
        assert!(request("2025-01-01T00:00:00Z", "pigeon", "x").into_new_notification().is_err());
        assert!(request("2025-01-01T00:00:00Z", "email", "").into_new_notification().is_err());

        let empty_message = ScheduleNotificationRequest {
            message: String::new(),
            ..request("2025-01-01T00:00:00Z", "email", "user@example.com")
        };
        assert!(empty_message.into_new_notification().is_err());
    }

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_id("123"), Err(ApiError::InvalidId(_))));
    }

    #[test]
    fn test_dead_letter_limit_default() {
        assert_eq!(DeadLetterQuery { limit: None }.limit(), 100);
        assert!(DeadLetterQuery { limit: Some(0) }.validate().is_err());
    }
}
