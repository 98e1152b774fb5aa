//! 数据模型模块
//!
//! 包含所有核心数据结构:
//! - errors: 错误类型定义 (队列、生产者、消费者、存储、缓存、查询级错误)
//! - log_record: 日志三形态 (提交载荷、临时回执、持久记录)
//! - session_record: 会话聚合记录 (计数器与活跃状态追踪)
//! - queue_message: 队列消息信封 (类型标签决定载荷形状)
//!
//! # 设计原则
//!
//! 1. **存在即合理**: 每个字段都有明确目的,无冗余
//! 2. **临时与持久分离**: PendingReceipt与LogRecord是两种类型,
//!    临时标识永远不会混入持久化查询
//! 3. **错误处理**: 所有校验返回 Result,提供完整上下文
//! 4. **日志安全**: 敏感数据不记录到日志 (如完整消息内容只记录长度)

pub mod errors;
pub mod log_record;
pub mod queue_message;
pub mod session_record;

// 重导出常用类型,简化外部引用
pub use errors::{
    CacheError, ExportError, ProcessError, ProducerError, QueryError, QueueError, StorageError,
};
pub use log_record::{
    LogFilter, LogLevel, LogPage, LogRecord, LogStats, LogSubmission, LogUpdate, PendingReceipt,
};
pub use queue_message::{ExportFilter, QueueMessage};
pub use session_record::{SessionFilter, SessionPage, SessionRecord, SessionStats};
