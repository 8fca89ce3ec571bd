//! 数据访问层

mod notification_repo;
mod traits;

pub use notification_repo::NotificationRepository;
pub use traits::NotificationStore;

#[cfg(test)]
pub use traits::MockNotificationStore;
