//! 日志查询服务
//!
//! 读路径: 缓存在前,存储在后。缓存未命中(或缓存故障)回源存储,
//! 命中结果按TTL回填。分页参数在到达存储之前校验并收敛上限

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{self, keys, Cache};
use crate::config::CacheTtlConfig;
use crate::models::{
    LogFilter, LogLevel, LogPage, LogRecord, LogStats, LogUpdate, QueryError,
};
use crate::storage::LogStore;

/// 日志查询服务
pub struct LogQueryService {
    store: Arc<dyn LogStore>,
    cache: Arc<dyn Cache>,
    ttl: CacheTtlConfig,
    /// 分页limit上限,超出静默收敛
    max_page_size: u64,
}

impl LogQueryService {
    pub fn new(
        store: Arc<dyn LogStore>,
        cache: Arc<dyn Cache>,
        ttl: CacheTtlConfig,
        max_page_size: u64,
    ) -> Self {
        Self {
            store,
            cache,
            ttl,
            max_page_size,
        }
    }

    /// 按ID查询单条日志 (缓存: `log:{id}`)
    ///
    /// # 错误
    /// 记录不存在返回 `QueryError::NotFound`
    pub async fn find_by_id(&self, id: &str) -> Result<LogRecord, QueryError> {
        let key = keys::log(id);
        if let Some(record) = cache::get_json::<LogRecord>(self.cache.as_ref(), &key).await {
            tracing::debug!(日志ID = %id, "日志缓存命中");
            return Ok(record);
        }

        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("日志不存在: {}", id)))?;

        cache::put_json(
            self.cache.as_ref(),
            &key,
            &record,
            Duration::from_secs(self.ttl.entity_secs),
        )
        .await;
        Ok(record)
    }

    /// 按会话查询全部日志,时间升序 (缓存: `session-logs:{sessionId}`)
    pub async fn find_by_session(&self, session_id: &str) -> Result<Vec<LogRecord>, QueryError> {
        let key = keys::session_logs(session_id);
        if let Some(logs) = cache::get_json::<Vec<LogRecord>>(self.cache.as_ref(), &key).await {
            tracing::debug!(会话ID = %session_id, "会话日志缓存命中");
            return Ok(logs);
        }

        let logs = self.store.find_by_session(session_id).await?;
        cache::put_json(
            self.cache.as_ref(),
            &key,
            &logs,
            Duration::from_secs(self.ttl.entity_secs),
        )
        .await;
        Ok(logs)
    }

    /// 按级别过滤查询 (不缓存,直接走存储过滤)
    pub async fn find_by_level(&self, level: LogLevel) -> Result<Vec<LogRecord>, QueryError> {
        let filter = LogFilter {
            level: Some(level),
            ..Default::default()
        };
        let logs = self.store.find_logs(&filter, 0, self.max_page_size).await?;
        Ok(logs)
    }

    /// 按时间范围查询
    pub async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>, QueryError> {
        Ok(self.store.find_by_time_range(start, end).await?)
    }

    /// 查询错误级别日志
    pub async fn find_error_logs(&self) -> Result<Vec<LogRecord>, QueryError> {
        self.find_by_level(LogLevel::Error).await
    }

    /// 分页过滤查询 (缓存: 过滤条件+页码复合键,短TTL)
    ///
    /// # 边界
    /// - `page`或`limit`为0时拒绝
    /// - `limit`超出上限时静默收敛到上限
    /// - 偏移量 `(page-1)*limit` 溢出u64时拒绝
    ///
    /// # 错误
    /// 返回 `QueryError::InvalidPagination` 如果分页参数无效
    pub async fn find_paginated(
        &self,
        filter: &LogFilter,
        page: u64,
        limit: u64,
    ) -> Result<LogPage, QueryError> {
        if page == 0 || limit == 0 {
            return Err(QueryError::InvalidPagination(format!(
                "page和limit必须大于0: page={}, limit={}",
                page, limit
            )));
        }
        let limit = limit.min(self.max_page_size);
        let offset = page
            .saturating_sub(1)
            .checked_mul(limit)
            .ok_or_else(|| {
                QueryError::InvalidPagination(format!(
                    "分页偏移量溢出: page={}, limit={}",
                    page, limit
                ))
            })?;

        let key = keys::log_page(filter, page, limit);
        if let Some(result) = cache::get_json::<LogPage>(self.cache.as_ref(), &key).await {
            tracing::debug!(页码 = page, "日志分页缓存命中");
            return Ok(result);
        }

        let logs = self.store.find_logs(filter, offset, limit).await?;
        let total = self.store.count_logs(filter).await?;
        let result = LogPage {
            logs,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        };

        cache::put_json(
            self.cache.as_ref(),
            &key,
            &result,
            Duration::from_secs(self.ttl.listing_secs),
        )
        .await;
        Ok(result)
    }

    /// 全局日志统计 (缓存: `log-stats`,长TTL)
    pub async fn stats(&self) -> Result<LogStats, QueryError> {
        let key = keys::log_stats();
        if let Some(stats) = cache::get_json::<LogStats>(self.cache.as_ref(), &key).await {
            tracing::debug!("日志统计缓存命中");
            return Ok(stats);
        }

        let stats = self.store.log_stats().await?;
        cache::put_json(
            self.cache.as_ref(),
            &key,
            &stats,
            Duration::from_secs(self.ttl.log_stats_secs),
        )
        .await;
        Ok(stats)
    }

    /// 更新日志的处理状态/元数据,并失效相关缓存
    ///
    /// # 错误
    /// 记录不存在返回 `QueryError::NotFound`
    pub async fn update(&self, id: &str, update: &LogUpdate) -> Result<LogRecord, QueryError> {
        let record = self
            .store
            .update_log(id, update)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("日志不存在: {}", id)))?;

        cache::forget(self.cache.as_ref(), &keys::log(id)).await;
        cache::forget(self.cache.as_ref(), &keys::session_logs(&record.session_id)).await;
        Ok(record)
    }

    /// 删除单条日志,并失效相关缓存
    ///
    /// # 错误
    /// 记录不存在返回 `QueryError::NotFound`
    pub async fn delete(&self, id: &str) -> Result<(), QueryError> {
        // 先读出会话ID用于缓存失效
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("日志不存在: {}", id)))?;

        let deleted = self.store.delete_log(id).await?;
        if !deleted {
            return Err(QueryError::NotFound(format!("日志不存在: {}", id)));
        }

        cache::forget(self.cache.as_ref(), &keys::log(id)).await;
        cache::forget(self.cache.as_ref(), &keys::session_logs(&record.session_id)).await;
        cache::forget(self.cache.as_ref(), &keys::log_stats()).await;
        tracing::info!(日志ID = %id, "日志已删除");
        Ok(())
    }
}
