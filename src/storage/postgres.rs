//! PostgreSQL存储实现
//!
//! 生产后端。连接池在全部读写间共享,池大小有界。
//! 幂等插入依赖fingerprint列的唯一约束 + `ON CONFLICT DO NOTHING`;
//! 会话计数器走单条upsert语句,在存储级原子完成

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::models::{
    LogFilter, LogLevel, LogRecord, LogStats, LogSubmission, LogUpdate, SessionFilter,
    SessionRecord, SessionStats, StorageError,
};

use super::{LogStore, SessionStore};

/// PostgreSQL存储
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// 建立连接池
    ///
    /// # 错误
    /// 返回 `StorageError::ConnectionFailed` 如果连接池创建失败
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        tracing::info!(最大连接数 = max_connections, "PostgreSQL连接池创建成功");
        Ok(Self { pool })
    }

    /// 获取连接池 (测试辅助方法)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 创建表结构(如果不存在)
    ///
    /// 启动时调用,重复执行安全
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                fingerprint UUID NOT NULL UNIQUE,
                level VARCHAR(10) NOT NULL,
                message TEXT NOT NULL,
                timestamp TIMESTAMP WITH TIME ZONE NOT NULL,
                session_id VARCHAR(100) NOT NULL,
                page_url TEXT NOT NULL,
                extension_id VARCHAR(100) NOT NULL,
                log_level VARCHAR(10) NOT NULL DEFAULT '',
                page_title TEXT,
                user_agent TEXT,
                referrer TEXT,
                stack_trace TEXT,
                browser_info JSONB,
                metadata JSONB,
                is_processed BOOLEAN NOT NULL DEFAULT FALSE,
                processing_attempts INT NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id VARCHAR(100) PRIMARY KEY,
                extension_id VARCHAR(100) NOT NULL,
                page_url TEXT NOT NULL,
                page_title TEXT,
                user_agent TEXT,
                referrer TEXT,
                browser_info JSONB,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                last_activity TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                total_logs BIGINT NOT NULL DEFAULT 0,
                error_count BIGINT NOT NULL DEFAULT 0,
                warning_count BIGINT NOT NULL DEFAULT 0,
                metadata JSONB,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_logs_session_created ON logs(session_id, created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_logs_level_created ON logs(level, created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_logs_page_url ON logs(page_url)",
            "CREATE INDEX IF NOT EXISTS idx_logs_extension ON logs(extension_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_extension_created ON sessions(extension_id, created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(is_active)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_last_activity ON sessions(last_activity DESC)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql).execute(&self.pool).await?;
        }

        tracing::info!("数据库表结构创建完成");
        Ok(())
    }

    /// 测试数据库连接
    pub async fn health_check(&self) -> Result<(), StorageError> {
        let result: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        if result == 1 {
            Ok(())
        } else {
            Err(StorageError::QueryFailed("健康检查查询返回异常".to_string()))
        }
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("数据库连接池已关闭");
    }
}

fn map_log_row(row: &PgRow) -> Result<LogRecord, StorageError> {
    let id: Uuid = row.try_get("id").map_err(sqlx_column)?;
    let fingerprint: Uuid = row.try_get("fingerprint").map_err(sqlx_column)?;
    let level_str: String = row.try_get("level").map_err(sqlx_column)?;
    let level: LogLevel = level_str
        .parse()
        .map_err(StorageError::SerializationError)?;

    Ok(LogRecord {
        id: id.to_string(),
        fingerprint,
        level,
        message: row.try_get("message").map_err(sqlx_column)?,
        timestamp: row.try_get("timestamp").map_err(sqlx_column)?,
        session_id: row.try_get("session_id").map_err(sqlx_column)?,
        page_url: row.try_get("page_url").map_err(sqlx_column)?,
        extension_id: row.try_get("extension_id").map_err(sqlx_column)?,
        log_level: row.try_get("log_level").map_err(sqlx_column)?,
        page_title: row.try_get("page_title").map_err(sqlx_column)?,
        user_agent: row.try_get("user_agent").map_err(sqlx_column)?,
        referrer: row.try_get("referrer").map_err(sqlx_column)?,
        stack_trace: row.try_get("stack_trace").map_err(sqlx_column)?,
        browser_info: row.try_get("browser_info").map_err(sqlx_column)?,
        metadata: row.try_get("metadata").map_err(sqlx_column)?,
        is_processed: row.try_get("is_processed").map_err(sqlx_column)?,
        processing_attempts: row.try_get("processing_attempts").map_err(sqlx_column)?,
        created_at: row.try_get("created_at").map_err(sqlx_column)?,
        updated_at: row.try_get("updated_at").map_err(sqlx_column)?,
    })
}

fn map_session_row(row: &PgRow) -> Result<SessionRecord, StorageError> {
    Ok(SessionRecord {
        session_id: row.try_get("session_id").map_err(sqlx_column)?,
        extension_id: row.try_get("extension_id").map_err(sqlx_column)?,
        page_url: row.try_get("page_url").map_err(sqlx_column)?,
        page_title: row.try_get("page_title").map_err(sqlx_column)?,
        user_agent: row.try_get("user_agent").map_err(sqlx_column)?,
        referrer: row.try_get("referrer").map_err(sqlx_column)?,
        browser_info: row.try_get("browser_info").map_err(sqlx_column)?,
        is_active: row.try_get("is_active").map_err(sqlx_column)?,
        last_activity: row.try_get("last_activity").map_err(sqlx_column)?,
        total_logs: row.try_get("total_logs").map_err(sqlx_column)?,
        error_count: row.try_get("error_count").map_err(sqlx_column)?,
        warning_count: row.try_get("warning_count").map_err(sqlx_column)?,
        metadata: row.try_get("metadata").map_err(sqlx_column)?,
        created_at: row.try_get("created_at").map_err(sqlx_column)?,
        updated_at: row.try_get("updated_at").map_err(sqlx_column)?,
    })
}

fn sqlx_column(err: sqlx::Error) -> StorageError {
    StorageError::QueryFailed(err.to_string())
}

/// 把日志过滤条件追加到WHERE子句
fn push_log_filter(qb: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &LogFilter) {
    if let Some(level) = filter.level {
        qb.push(" AND level = ").push_bind(level.as_str());
    }
    if let Some(ref session_id) = filter.session_id {
        qb.push(" AND session_id = ").push_bind(session_id.clone());
    }
    if let Some(ref page_url) = filter.page_url {
        qb.push(" AND page_url ILIKE ")
            .push_bind(format!("%{}%", page_url));
    }
    if let Some(ref extension_id) = filter.extension_id {
        qb.push(" AND extension_id = ")
            .push_bind(extension_id.clone());
    }
    if let Some(start) = filter.start {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

fn push_session_filter(qb: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &SessionFilter) {
    if let Some(ref extension_id) = filter.extension_id {
        qb.push(" AND extension_id = ")
            .push_bind(extension_id.clone());
    }
    if let Some(ref page_url) = filter.page_url {
        qb.push(" AND page_url ILIKE ")
            .push_bind(format!("%{}%", page_url));
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(is_active);
    }
}

#[async_trait]
impl LogStore for PgStore {
    async fn insert_log(
        &self,
        submission: &LogSubmission,
        attempts: i32,
    ) -> Result<Option<LogRecord>, StorageError> {
        let row = sqlx::query(
            r#"
            INSERT INTO logs (
                fingerprint, level, message, timestamp, session_id, page_url,
                extension_id, log_level, page_title, user_agent, referrer,
                stack_trace, browser_info, metadata, is_processed, processing_attempts
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, TRUE, $15)
            ON CONFLICT (fingerprint) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(submission.fingerprint())
        .bind(submission.level.as_str())
        .bind(&submission.message)
        .bind(submission.timestamp)
        .bind(&submission.session_id)
        .bind(&submission.page_url)
        .bind(&submission.extension_id)
        .bind(&submission.log_level)
        .bind(&submission.page_title)
        .bind(&submission.user_agent)
        .bind(&submission.referrer)
        .bind(&submission.stack_trace)
        .bind(&submission.browser_info)
        .bind(&submission.metadata)
        .bind(attempts)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_log_row).transpose()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<LogRecord>, StorageError> {
        // ID无法解析为UUID时视为不存在
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let row = sqlx::query("SELECT * FROM logs WHERE id = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_log_row).transpose()
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Vec<LogRecord>, StorageError> {
        let rows = sqlx::query("SELECT * FROM logs WHERE session_id = $1 ORDER BY timestamp ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_log_row).collect()
    }

    async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM logs WHERE created_at >= $1 AND created_at <= $2 ORDER BY created_at DESC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_log_row).collect()
    }

    async fn find_all(&self) -> Result<Vec<LogRecord>, StorageError> {
        let rows = sqlx::query("SELECT * FROM logs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_log_row).collect()
    }

    async fn find_logs(
        &self,
        filter: &LogFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LogRecord>, StorageError> {
        let mut qb = QueryBuilder::new("SELECT * FROM logs WHERE 1=1");
        push_log_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit.min(i64::MAX as u64) as i64)
            .push(" OFFSET ")
            .push_bind(offset.min(i64::MAX as u64) as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_log_row).collect()
    }

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64, StorageError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM logs WHERE 1=1");
        push_log_filter(&mut qb, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn update_log(
        &self,
        id: &str,
        update: &LogUpdate,
    ) -> Result<Option<LogRecord>, StorageError> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let row = sqlx::query(
            r#"
            UPDATE logs
            SET
                is_processed = COALESCE($1, is_processed),
                processing_attempts = GREATEST(processing_attempts, COALESCE($2, processing_attempts)),
                metadata = COALESCE($3, metadata),
                updated_at = NOW()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(update.is_processed)
        .bind(update.processing_attempts)
        .bind(&update.metadata)
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_log_row).transpose()
    }

    async fn delete_log(&self, id: &str) -> Result<bool, StorageError> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM logs WHERE id = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_logs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn log_stats(&self) -> Result<LogStats, StorageError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;

        let mut stats = LogStats {
            total: total as u64,
            by_level: Default::default(),
            by_extension: Default::default(),
            by_session: Default::default(),
        };

        let by_level = sqlx::query("SELECT level, COUNT(*) AS count FROM logs GROUP BY level")
            .fetch_all(&self.pool)
            .await?;
        for row in &by_level {
            let key: String = row.try_get("level").map_err(sqlx_column)?;
            let count: i64 = row.try_get("count").map_err(sqlx_column)?;
            stats.by_level.insert(key, count as u64);
        }

        let by_extension =
            sqlx::query("SELECT extension_id, COUNT(*) AS count FROM logs GROUP BY extension_id")
                .fetch_all(&self.pool)
                .await?;
        for row in &by_extension {
            let key: String = row.try_get("extension_id").map_err(sqlx_column)?;
            let count: i64 = row.try_get("count").map_err(sqlx_column)?;
            stats.by_extension.insert(key, count as u64);
        }

        let by_session =
            sqlx::query("SELECT session_id, COUNT(*) AS count FROM logs GROUP BY session_id")
                .fetch_all(&self.pool)
                .await?;
        for row in &by_session {
            let key: String = row.try_get("session_id").map_err(sqlx_column)?;
            let count: i64 = row.try_get("count").map_err(sqlx_column)?;
            stats.by_session.insert(key, count as u64);
        }

        Ok(stats)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn apply_log(&self, submission: &LogSubmission) -> Result<SessionRecord, StorageError> {
        let error_inc: i64 = if submission.level == LogLevel::Error { 1 } else { 0 };
        let warning_inc: i64 = if submission.level == LogLevel::Warn { 1 } else { 0 };

        // 单条upsert在存储级原子完成计数器递增,
        // last_activity用GREATEST保证只向前移动,is_active保持不变
        let row = sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, extension_id, page_url, page_title, user_agent,
                referrer, browser_info, metadata, is_active, last_activity,
                total_logs, error_count, warning_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, NOW(), 1, $9, $10)
            ON CONFLICT (session_id) DO UPDATE SET
                total_logs = sessions.total_logs + 1,
                error_count = sessions.error_count + $9,
                warning_count = sessions.warning_count + $10,
                last_activity = GREATEST(sessions.last_activity, NOW()),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&submission.session_id)
        .bind(&submission.extension_id)
        .bind(&submission.page_url)
        .bind(&submission.page_title)
        .bind(&submission.user_agent)
        .bind(&submission.referrer)
        .bind(&submission.browser_info)
        .bind(&submission.metadata)
        .bind(error_inc)
        .bind(warning_inc)
        .fetch_one(&self.pool)
        .await?;

        map_session_row(&row)
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_session_row).transpose()
    }

    async fn active_sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let rows =
            sqlx::query("SELECT * FROM sessions WHERE is_active = TRUE ORDER BY last_activity DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(map_session_row).collect()
    }

    async fn find_sessions(
        &self,
        filter: &SessionFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let mut qb = QueryBuilder::new("SELECT * FROM sessions WHERE 1=1");
        push_session_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit.min(i64::MAX as u64) as i64)
            .push(" OFFSET ")
            .push_bind(offset.min(i64::MAX as u64) as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_session_row).collect()
    }

    async fn count_sessions(&self, filter: &SessionFilter) -> Result<u64, StorageError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM sessions WHERE 1=1");
        push_session_filter(&mut qb, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn touch_activity(&self, session_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET last_activity = GREATEST(last_activity, NOW()), updated_at = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_if_active(&self, session_id: &str) -> Result<bool, StorageError> {
        // 条件原子更新: 与消费者的计数更新并发安全
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = FALSE, updated_at = NOW()
            WHERE session_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn expired_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE is_active = TRUE AND last_activity < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_session_row).collect()
    }

    async fn session_stats(&self) -> Result<SessionStats, StorageError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE is_active = TRUE")
                .fetch_one(&self.pool)
                .await?;

        let mut by_extension = std::collections::HashMap::new();
        let rows = sqlx::query(
            "SELECT extension_id, COUNT(*) AS count FROM sessions GROUP BY extension_id",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in &rows {
            let key: String = row.try_get("extension_id").map_err(sqlx_column)?;
            let count: i64 = row.try_get("count").map_err(sqlx_column)?;
            by_extension.insert(key, count as u64);
        }

        Ok(SessionStats {
            total: total as u64,
            active: active as u64,
            inactive: (total - active) as u64,
            by_extension,
        })
    }
}
