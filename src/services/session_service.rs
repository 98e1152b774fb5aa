//! 会话服务
//!
//! 会话的读路径与生命周期管理。会话由日志摄取隐式创建(消费者的upsert),
//! 此处只负责查询、显式停用和空闲清扫。
//! 停用是单向操作: 已停用的会话收到新日志时计数器继续累加,但不会复活

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;

use crate::cache::{self, keys, Cache};
use crate::config::CacheTtlConfig;
use crate::models::{QueryError, SessionFilter, SessionPage, SessionRecord, SessionStats};
use crate::storage::SessionStore;

/// 会话服务
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    cache: Arc<dyn Cache>,
    ttl: CacheTtlConfig,
    max_page_size: u64,
    /// 空闲过期窗口
    expiry: ChronoDuration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        cache: Arc<dyn Cache>,
        ttl: CacheTtlConfig,
        max_page_size: u64,
        expiry_hours: i64,
    ) -> Self {
        Self {
            store,
            cache,
            ttl,
            max_page_size,
            expiry: ChronoDuration::hours(expiry_hours),
        }
    }

    /// 活跃会话列表,最近活动优先 (缓存: `sessions:active`)
    pub async fn active_sessions(&self) -> Result<Vec<SessionRecord>, QueryError> {
        let key = keys::sessions_active();
        if let Some(sessions) =
            cache::get_json::<Vec<SessionRecord>>(self.cache.as_ref(), &key).await
        {
            tracing::debug!("活跃会话缓存命中");
            return Ok(sessions);
        }

        let sessions = self.store.active_sessions().await?;
        cache::put_json(
            self.cache.as_ref(),
            &key,
            &sessions,
            Duration::from_secs(self.ttl.entity_secs),
        )
        .await;
        Ok(sessions)
    }

    /// 按会话ID查询 (缓存: `session:{sessionId}`)
    ///
    /// # 错误
    /// 会话不存在返回 `QueryError::NotFound`
    pub async fn find_by_id(&self, session_id: &str) -> Result<SessionRecord, QueryError> {
        let key = keys::session(session_id);
        if let Some(session) = cache::get_json::<SessionRecord>(self.cache.as_ref(), &key).await {
            tracing::debug!(会话ID = %session_id, "会话缓存命中");
            return Ok(session);
        }

        let session = self
            .store
            .find_by_session_id(session_id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("会话不存在: {}", session_id)))?;

        cache::put_json(
            self.cache.as_ref(),
            &key,
            &session,
            Duration::from_secs(self.ttl.entity_secs),
        )
        .await;
        Ok(session)
    }

    /// 分页过滤查询 (缓存: 过滤条件+页码复合键,短TTL)
    ///
    /// # 错误
    /// 返回 `QueryError::InvalidPagination` 如果page或limit为0,或偏移量溢出
    pub async fn find_paginated(
        &self,
        filter: &SessionFilter,
        page: u64,
        limit: u64,
    ) -> Result<SessionPage, QueryError> {
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

        let key = keys::session_page(filter, page, limit);
        if let Some(result) = cache::get_json::<SessionPage>(self.cache.as_ref(), &key).await {
            tracing::debug!(页码 = page, "会话分页缓存命中");
            return Ok(result);
        }

        let sessions = self.store.find_sessions(filter, offset, limit).await?;
        let total = self.store.count_sessions(filter).await?;
        let result = SessionPage {
            sessions,
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

    /// 会话聚合统计 (缓存: `stats:sessions`)
    pub async fn stats(&self) -> Result<SessionStats, QueryError> {
        let key = keys::session_stats();
        if let Some(stats) = cache::get_json::<SessionStats>(self.cache.as_ref(), &key).await {
            tracing::debug!("会话统计缓存命中");
            return Ok(stats);
        }

        let stats = self.store.session_stats().await?;
        cache::put_json(
            self.cache.as_ref(),
            &key,
            &stats,
            Duration::from_secs(self.ttl.session_stats_secs),
        )
        .await;
        Ok(stats)
    }

    /// 刷新会话活动时间
    ///
    /// # 错误
    /// 会话不存在返回 `QueryError::NotFound`
    pub async fn touch_activity(&self, session_id: &str) -> Result<(), QueryError> {
        let touched = self.store.touch_activity(session_id).await?;
        if !touched {
            return Err(QueryError::NotFound(format!("会话不存在: {}", session_id)));
        }
        self.invalidate_session_caches(session_id).await;
        Ok(())
    }

    /// 显式停用会话
    ///
    /// 幂等: 已停用的会话重复停用返回Ok,不报错
    ///
    /// # 错误
    /// 会话不存在返回 `QueryError::NotFound`
    pub async fn deactivate(&self, session_id: &str) -> Result<(), QueryError> {
        let deactivated = self.store.deactivate_if_active(session_id).await?;
        if !deactivated {
            // 区分"不存在"与"已停用"
            if self.store.find_by_session_id(session_id).await?.is_none() {
                return Err(QueryError::NotFound(format!("会话不存在: {}", session_id)));
            }
            tracing::debug!(会话ID = %session_id, "会话已是停用状态");
            return Ok(());
        }

        tracing::info!(会话ID = %session_id, "会话已停用");
        self.invalidate_session_caches(session_id).await;
        Ok(())
    }

    /// 清扫空闲会话: 停用所有超过过期窗口无活动的活跃会话
    ///
    /// # 返回值
    /// 本次停用的会话数
    pub async fn sweep_idle(&self) -> Result<usize, QueryError> {
        let cutoff = Utc::now() - self.expiry;
        let expired = self.store.expired_sessions(cutoff).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut deactivated = 0usize;
        for session in &expired {
            if self.store.deactivate_if_active(&session.session_id).await? {
                deactivated += 1;
                cache::forget(self.cache.as_ref(), &keys::session(&session.session_id)).await;
            }
        }

        cache::forget(self.cache.as_ref(), &keys::sessions_active()).await;
        cache::forget(self.cache.as_ref(), &keys::session_stats()).await;
        tracing::info!(过期会话数 = expired.len(), 停用数 = deactivated, "空闲会话清扫完成");
        Ok(deactivated)
    }

    async fn invalidate_session_caches(&self, session_id: &str) {
        cache::forget(self.cache.as_ref(), &keys::session(session_id)).await;
        cache::forget(self.cache.as_ref(), &keys::sessions_active()).await;
        cache::forget(self.cache.as_ref(), &keys::session_stats()).await;
    }
}

/// 启动后台空闲清扫任务
///
/// 固定间隔调用`sweep_idle`,取消令牌触发后立即退出。
/// 清扫失败只记录错误,下个周期继续
pub fn spawn_idle_sweeper(
    service: Arc<SessionService>,
    interval_secs: u64,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // 第一个tick立即返回,跳过避免启动即清扫
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = service.sweep_idle().await {
                        tracing::error!(错误 = %e, "空闲会话清扫失败");
                    }
                }
            }
        }
        tracing::info!("空闲会话清扫任务已退出");
    })
}
