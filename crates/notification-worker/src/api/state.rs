//! 应用状态

use crate::service::NotificationService;

/// Axum 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub notifications: NotificationService,
}

impl AppState {
    pub fn new(notifications: NotificationService) -> Self {
        Self { notifications }
    }
}
