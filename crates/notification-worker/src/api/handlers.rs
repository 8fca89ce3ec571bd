//! 通知 API 处理器

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use notifier_shared::dlq::DeadLetterMessage;
use tracing::info;
use validator::Validate;

use super::dto::{
    ApiResponse, DeadLetterQuery, ScheduleNotificationRequest, ScheduledDto, StatusDto, parse_id,
};
use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// 创建定时通知
///
/// POST /api/notify
pub async fn schedule_notification(
    State(state): State<AppState>,
    payload: Result<Json<ScheduleNotificationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ScheduledDto>>)> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let input = req.into_new_notification()?;

    let notification = state.notifications.schedule(input).await?;
    info!(notification_id = %notification.id, "创建通知请求处理完成");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ScheduledDto {
            id: notification.id,
            scheduled_at: notification.scheduled_at,
        })),
    ))
}

/// 查询通知状态
///
/// GET /api/notify/{id}
pub async fn get_notification_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<StatusDto>>> {
    let id = parse_id(&id)?;
    let status = state.notifications.status(id).await?;
    Ok(Json(ApiResponse::success(StatusDto { id, status })))
}

/// 取消通知
///
/// DELETE /api/notify/{id}
pub async fn cancel_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_id(&id)?;
    state.notifications.cancel(id).await?;
    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 查看死信
///
/// GET /api/dead-letters?limit=N
pub async fn list_dead_letters(
    State(state): State<AppState>,
    Query(query): Query<DeadLetterQuery>,
) -> ApiResult<Json<ApiResponse<Vec<DeadLetterMessage>>>> {
    query.validate()?;
    let items = state.notifications.dead_letters(query.limit()).await?;
    Ok(Json(ApiResponse::success(items)))
}
