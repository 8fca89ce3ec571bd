//! 共享库
//!
//! 包含通知服务共用的配置、错误处理、数据库连接、缓存、延迟队列等基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod delay_queue;
pub mod dlq;
pub mod error;
pub mod observability;
pub mod retry;
pub mod test_utils;
