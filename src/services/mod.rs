//! 业务服务层
//!
//! 存在即合理:
//! - `log_query`: 日志读路径,缓存在前存储在后
//! - `session_service`: 会话查询与生命周期 (停用、空闲清扫)
//! - `export`: 队列驱动的日志导出

pub mod export;
pub mod log_query;
pub mod session_service;

pub use export::{ExportSink, JsonLinesSink, MemorySink};
pub use log_query::LogQueryService;
pub use session_service::{spawn_idle_sweeper, SessionService};
