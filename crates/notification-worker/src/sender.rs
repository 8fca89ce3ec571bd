//! 渠道发送器
//!
//! 通过 `ChannelSender` trait 抽象发送行为，`SenderRegistry` 负责渠道到发送器的映射。
//! 注册表在启动时构建，之后只读；未注册的渠道在创建通知时即被拒绝。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use notifier_shared::config::SmtpConfig;
use notifier_shared::error::NotifierError;
use notifier_shared::observability::metrics;
use tracing::{debug, info};

use crate::error::{NotificationError, Result};
use crate::models::NotificationChannel;

/// 渠道发送器
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// 发送一条消息到指定接收方
    async fn send(&self, message: &str, recipient: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// 邮件发送器
// ---------------------------------------------------------------------------

/// 邮件主题固定，正文为纯文本
const EMAIL_SUBJECT: &str = "Notification";

/// SMTP 邮件发送器
pub struct EmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotifierError::Config(format!("smtp.from 非法: {e}")))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotifierError::Config(format!("SMTP relay 配置错误: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        info!(
            host = %config.host,
            port = config.port,
            starttls = config.starttls,
            "邮件发送器已创建"
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, message: &str, recipient: &str) -> Result<Message> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| NotificationError::Validation(format!("收件人地址非法: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(EMAIL_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .map_err(|e| NotificationError::Validation(format!("构建邮件失败: {e}")))
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    async fn send(&self, message: &str, recipient: &str) -> Result<()> {
        let email = self.build_message(message, recipient)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::SendFailed {
                channel: NotificationChannel::Email,
                reason: e.to_string(),
            })?;

        debug!(recipient, "邮件已发送");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 发送器注册表
// ---------------------------------------------------------------------------

/// 渠道 -> 发送器
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<NotificationChannel, Arc<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册发送器，同一渠道重复注册时后者覆盖前者
    pub fn register(mut self, channel: NotificationChannel, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    pub fn supports(&self, channel: NotificationChannel) -> bool {
        self.senders.contains_key(&channel)
    }

    /// 渠道未注册时返回 `UnknownChannel`
    pub fn ensure_supported(&self, channel: NotificationChannel) -> Result<()> {
        if self.supports(channel) {
            Ok(())
        } else {
            Err(NotificationError::UnknownChannel(channel))
        }
    }

    /// 通过对应渠道发送
    pub async fn send(&self, channel: NotificationChannel, message: &str, recipient: &str) -> Result<()> {
        let sender = self
            .senders
            .get(&channel)
            .ok_or(NotificationError::UnknownChannel(channel))?;

        let result = sender.send(message, recipient).await;
        metrics::record_send_attempt(channel.as_str(), result.is_ok());
        result
    }
}
