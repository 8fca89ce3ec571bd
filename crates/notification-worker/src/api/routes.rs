//! 路由配置

use axum::{
    Router,
    routing::{get, post},
};

use super::{handlers, state::AppState};

/// `/api` 下的业务路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/notify", post(handlers::schedule_notification))
        .route(
            "/notify/{id}",
            get(handlers::get_notification_status).delete(handlers::cancel_notification),
        )
        .route("/dead-letters", get(handlers::list_dead_letters))
}

/// 挂载好状态的完整业务路由
pub fn router(state: AppState) -> Router {
    Router::new().nest("/api", api_routes()).with_state(state)
}
