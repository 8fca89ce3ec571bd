//! 延迟通知服务
//!
//! 接收定时通知请求，持久化后投递到延迟队列；到期后由分发 worker 池重新确认状态，
//! 通过对应渠道发送，并把最终状态回写到数据库和 Redis 缓存。

pub mod api;
pub mod error;
pub mod handler;
pub mod models;
pub mod publisher;
pub mod repository;
pub mod resolver;
pub mod sender;
pub mod service;
pub mod status_cache;
pub mod test_utils;
pub mod worker;

pub use error::{NotificationError, Result};
pub use models::{DispatchMessage, NewNotification, Notification, NotificationChannel, NotificationStatus};
pub use service::NotificationService;
