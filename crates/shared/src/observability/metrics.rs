//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "notifications_scheduled_total",
        "Total number of scheduled notifications"
    );
    metrics::describe_counter!(
        "notifications_dispatched_total",
        "Total number of dispatched notifications by final status"
    );
    metrics::describe_counter!(
        "notifications_skipped_total",
        "Total number of deliveries skipped at dispatch time"
    );
    metrics::describe_counter!(
        "notification_send_attempts_total",
        "Total number of channel send attempts"
    );
    metrics::describe_histogram!(
        "notification_dispatch_duration_seconds",
        "Dispatch duration in seconds"
    );
    metrics::describe_counter!(
        "notifications_dead_lettered_total",
        "Total number of messages moved to the dead letter queue"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录通知创建
#[inline]
pub fn record_scheduled(channel: &str) {
    metrics::counter!(
        "notifications_scheduled_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录一次分发的最终状态
#[inline]
pub fn record_dispatch(channel: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "notifications_dispatched_total",
        "channel" => channel.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "notification_dispatch_duration_seconds",
        "channel" => channel.to_string()
    )
    .record(duration_secs);
}

/// 记录分发时被跳过的投递（已取消、已终态、记录不存在）
#[inline]
pub fn record_skipped(reason: &str) {
    metrics::counter!(
        "notifications_skipped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录一次渠道发送尝试
#[inline]
pub fn record_send_attempt(channel: &str, success: bool) {
    metrics::counter!(
        "notification_send_attempts_total",
        "channel" => channel.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

/// 记录转入死信
#[inline]
pub fn record_dead_lettered(queue: &str, reason: &str) {
    metrics::counter!(
        "notifications_dead_lettered_total",
        "queue" => queue.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_scheduled("email");
        record_dispatch("email", "sent", 0.2);
        record_skipped("canceled");
        record_send_attempt("email", false);
        record_dead_lettered("notifications", "max_deliveries_exceeded");
    }
}
