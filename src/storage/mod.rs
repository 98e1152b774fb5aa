//! 持久化存储模块
//!
//! 存储是核心的协作方接口: 文档CRUD + 条件查询 + 按字段聚合计数。
//! 两个后端:
//! - `memory`: 进程内实现,测试与无外部依赖场景的默认后端
//! - `postgres`: sqlx实现,生产后端
//!
//! 会话计数器更新是读-改-写: 单消费者逐条处理使其天然串行;
//! 管理路径(如直接停用会话)改同一条记录时必须走存储级的
//! 条件原子更新 (`deactivate_if_active`),而非读-改-写

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    LogFilter, LogRecord, LogStats, LogSubmission, LogUpdate, SessionFilter, SessionRecord,
    SessionStats, StorageError,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// 日志存储
#[async_trait]
pub trait LogStore: Send + Sync {
    /// 按内容指纹条件插入
    ///
    /// 指纹已存在时no-op并返回 `Ok(None)` - 这是至少一次投递下的
    /// 幂等保障: 重投的消息不会产生重复记录。
    /// `attempts`记录本条消息的投递次数
    async fn insert_log(
        &self,
        submission: &LogSubmission,
        attempts: i32,
    ) -> Result<Option<LogRecord>, StorageError>;

    /// 按记录ID查询
    async fn find_by_id(&self, id: &str) -> Result<Option<LogRecord>, StorageError>;

    /// 按会话查询,按事件时间升序
    async fn find_by_session(&self, session_id: &str) -> Result<Vec<LogRecord>, StorageError>;

    /// 按落库时间范围查询,按落库时间降序
    async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>, StorageError>;

    /// 全量查询,按落库时间降序
    async fn find_all(&self) -> Result<Vec<LogRecord>, StorageError>;

    /// 条件分页查询,按落库时间降序
    async fn find_logs(
        &self,
        filter: &LogFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LogRecord>, StorageError>;

    /// 条件计数
    async fn count_logs(&self, filter: &LogFilter) -> Result<u64, StorageError>;

    /// 更新处理状态/元数据
    async fn update_log(
        &self,
        id: &str,
        update: &LogUpdate,
    ) -> Result<Option<LogRecord>, StorageError>;

    /// 删除单条记录
    async fn delete_log(&self, id: &str) -> Result<bool, StorageError>;

    /// 删除落库时间早于截止点的记录,返回删除条数
    async fn delete_logs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;

    /// 聚合统计: 总数 + 按级别/扩展/会话计数
    async fn log_stats(&self) -> Result<LogStats, StorageError>;
}

/// 会话存储
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 把一条日志计入所属会话
    ///
    /// 会话不存在则创建;存在则计数器递增、`last_activity`前移。
    /// 不会把已停用的会话改回活跃 (true→false单向)
    async fn apply_log(&self, submission: &LogSubmission) -> Result<SessionRecord, StorageError>;

    /// 按会话ID查询
    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, StorageError>;

    /// 活跃会话,按最近活动降序
    async fn active_sessions(&self) -> Result<Vec<SessionRecord>, StorageError>;

    /// 条件分页查询,按创建时间降序
    async fn find_sessions(
        &self,
        filter: &SessionFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StorageError>;

    /// 条件计数
    async fn count_sessions(&self, filter: &SessionFilter) -> Result<u64, StorageError>;

    /// 刷新最近活动时间 (只向前移动)
    async fn touch_activity(&self, session_id: &str) -> Result<bool, StorageError>;

    /// 条件停用: 仅当会话当前活跃时生效
    ///
    /// 存储级原子操作,与消费者的计数更新并发安全
    async fn deactivate_if_active(&self, session_id: &str) -> Result<bool, StorageError>;

    /// 最近活动早于截止点的活跃会话 (空闲清扫的候选)
    async fn expired_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StorageError>;

    /// 聚合统计: 总数/活跃/非活跃 + 按扩展计数
    async fn session_stats(&self) -> Result<SessionStats, StorageError>;
}
