//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 业务层错误在各服务 crate 内定义，通过 `#[from]` 包装本类型。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum NotifierError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== 缓存错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("缓存未命中: {key}")]
    CacheMiss { key: String },

    // ==================== 队列错误 ====================
    #[error("延迟队列错误: {0}")]
    Queue(String),

    #[error("队列拓扑冲突: queue={queue}, 已绑定 dlq={existing}, 期望 dlq={requested}")]
    TopologyConflict {
        queue: String,
        existing: String,
        requested: String,
    },

    // ==================== 序列化错误 ====================
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================== 验证与配置错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("配置错误: {0}")]
    Config(String),

    // ==================== 外部服务错误 ====================
    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("外部服务超时: {service}")]
    ExternalServiceTimeout { service: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, NotifierError>;

impl NotifierError {
    /// 构造通知记录未找到错误
    pub fn notification_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "Notification".to_string(),
            id: id.to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Redis(_) => "REDIS_ERROR",
            Self::CacheMiss { .. } => "CACHE_MISS",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::TopologyConflict { .. } => "TOPOLOGY_CONFLICT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::ExternalServiceTimeout { .. } => "EXTERNAL_SERVICE_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 只有瞬时基础设施故障可重试；NotFound、校验、配置类错误重试也不会成功。
    pub fn is_retryable(&self) -> bool {
        match self {
            // 行不存在是确定性结果，不属于瞬时故障
            Self::Database(sqlx::Error::RowNotFound) => false,
            Self::Database(_)
            | Self::Redis(_)
            | Self::Queue(_)
            | Self::ExternalService { .. }
            | Self::ExternalServiceTimeout { .. } => true,
            _ => false,
        }
    }

    /// 是否为"记录不存在"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Database(sqlx::Error::RowNotFound)
        )
    }
}
