//! 延迟通知服务
//!
//! 同一进程内运行 REST 接口与分发 worker 池。

use std::sync::Arc;

use axum::{Json, Router, routing::get};
use notification_worker::api::{self, AppState};
use notification_worker::handler::DispatchHandler;
use notification_worker::models::NotificationChannel;
use notification_worker::publisher::DelayScheduler;
use notification_worker::repository::NotificationRepository;
use notification_worker::sender::{EmailSender, SenderRegistry};
use notification_worker::service::NotificationService;
use notification_worker::status_cache::RedisStatusCache;
use notification_worker::worker::DispatchWorkerPool;
use notifier_shared::{
    cache::Cache,
    config::AppConfig,
    database::Database,
    delay_queue::{DelayQueue, RedisDelayQueue},
    observability,
    retry::RetryPolicy,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const SERVICE_NAME: &str = "notification-worker";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    let config = AppConfig::load(SERVICE_NAME)?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        "Starting {} on {}",
        SERVICE_NAME,
        config.server_addr()
    );

    let retry_policy = RetryPolicy::from(&config.retry);

    // 基础设施
    let db = Database::connect_with_retry(&config.database, &retry_policy).await?;
    let cache = Cache::new(&config.redis)?;
    cache.health_check().await?;

    let queue: Arc<dyn DelayQueue> = Arc::new(RedisDelayQueue::new(cache.clone(), &config.queue));
    let store = Arc::new(NotificationRepository::new(db.pool().clone()));
    let status_cache = Arc::new(RedisStatusCache::new(
        cache.clone(),
        config.redis.status_ttl(),
        retry_policy.clone(),
    ));

    // 渠道注册表：目前只有邮件
    let senders = SenderRegistry::new().register(
        NotificationChannel::Email,
        Arc::new(EmailSender::new(&config.smtp)?),
    );

    let scheduler = DelayScheduler::new(queue.clone(), retry_policy.clone());
    scheduler.declare_topology().await?;

    let service = NotificationService::new(
        store.clone(),
        status_cache.clone(),
        scheduler,
        senders.clone(),
    );

    // 分发 worker 池
    let handler = Arc::new(DispatchHandler::new(
        store,
        status_cache,
        senders,
        queue.clone(),
        retry_policy,
    ));
    let pool = DispatchWorkerPool::new(queue, handler, &config.worker, &config.queue);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool_task = tokio::spawn(pool.run(shutdown_rx));

    let app = Router::new()
        .merge(api::router(AppState::new(service)))
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let db_for_ready = db.clone();
                let cache_for_ready = cache;
                move || readiness_check(db_for_ready.clone(), cache_for_ready.clone())
            }),
        )
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 先停止接收请求，再通知 worker 池：worker 处理完手上的消息后退出
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = pool_task.await {
        error!(error = %e, "worker 池异常退出");
    }

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号（SIGTERM / Ctrl+C）
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// 存活探针
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪探针：检查数据库和 Redis 连接
async fn readiness_check(db: Database, cache: Cache) -> Json<serde_json::Value> {
    let db_ok = db.health_check().await.is_ok();
    let cache_ok = cache.health_check().await.is_ok();
    let all_ok = db_ok && cache_ok;

    Json(serde_json::json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "service": SERVICE_NAME,
        "checks": {
            "database": if db_ok { "ok" } else { "fail" },
            "redis": if cache_ok { "ok" } else { "fail" }
        },
        "pool": db.stats()
    }))
}
