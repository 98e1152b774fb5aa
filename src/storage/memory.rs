//! 进程内存储实现
//!
//! 测试与无外部依赖场景的默认后端。
//! 单把互斥锁保护全部状态,临界区内无await

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    LogFilter, LogLevel, LogRecord, LogStats, LogSubmission, LogUpdate, SessionFilter,
    SessionRecord, SessionStats, StorageError,
};

use super::{LogStore, SessionStore};

#[derive(Default)]
struct MemoryInner {
    logs: Vec<LogRecord>,
    fingerprints: HashSet<Uuid>,
    sessions: HashMap<String, SessionRecord>,
}

/// 进程内存储
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("存储锁中毒")
    }

    /// 把会话的最后活动时间倒拨N小时 (测试辅助方法,模拟空闲会话)
    pub fn backdate_session_activity(&self, session_id: &str, hours: i64) {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.last_activity = Utc::now() - chrono::Duration::hours(hours);
        }
    }
}

/// 日志过滤判定,与PostgreSQL后端的WHERE子句语义一致
fn matches_log(record: &LogRecord, filter: &LogFilter) -> bool {
    if let Some(level) = filter.level {
        if record.level != level {
            return false;
        }
    }
    if let Some(ref session_id) = filter.session_id {
        if &record.session_id != session_id {
            return false;
        }
    }
    if let Some(ref page_url) = filter.page_url {
        // 大小写不敏感子串匹配
        if !record
            .page_url
            .to_lowercase()
            .contains(&page_url.to_lowercase())
        {
            return false;
        }
    }
    if let Some(ref extension_id) = filter.extension_id {
        if &record.extension_id != extension_id {
            return false;
        }
    }
    if let Some(start) = filter.start {
        if record.created_at < start {
            return false;
        }
    }
    if let Some(end) = filter.end {
        if record.created_at > end {
            return false;
        }
    }
    true
}

fn matches_session(record: &SessionRecord, filter: &SessionFilter) -> bool {
    if let Some(ref extension_id) = filter.extension_id {
        if &record.extension_id != extension_id {
            return false;
        }
    }
    if let Some(ref page_url) = filter.page_url {
        if !record
            .page_url
            .to_lowercase()
            .contains(&page_url.to_lowercase())
        {
            return false;
        }
    }
    if let Some(is_active) = filter.is_active {
        if record.is_active != is_active {
            return false;
        }
    }
    true
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn insert_log(
        &self,
        submission: &LogSubmission,
        attempts: i32,
    ) -> Result<Option<LogRecord>, StorageError> {
        let fingerprint = submission.fingerprint();
        let mut inner = self.lock();
        if !inner.fingerprints.insert(fingerprint) {
            // 指纹冲突: 重复投递,no-op
            return Ok(None);
        }

        let record = LogRecord::from_submission(Uuid::new_v4().to_string(), submission, attempts);
        inner.logs.push(record.clone());
        Ok(Some(record))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<LogRecord>, StorageError> {
        let inner = self.lock();
        Ok(inner.logs.iter().find(|l| l.id == id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Vec<LogRecord>, StorageError> {
        let inner = self.lock();
        let mut logs: Vec<LogRecord> = inner
            .logs
            .iter()
            .filter(|l| l.session_id == session_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.timestamp);
        Ok(logs)
    }

    async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>, StorageError> {
        let filter = LogFilter {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        };
        self.find_logs(&filter, 0, u64::MAX).await
    }

    async fn find_all(&self) -> Result<Vec<LogRecord>, StorageError> {
        self.find_logs(&LogFilter::default(), 0, u64::MAX).await
    }

    async fn find_logs(
        &self,
        filter: &LogFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LogRecord>, StorageError> {
        let inner = self.lock();
        let mut logs: Vec<LogRecord> = inner
            .logs
            .iter()
            .filter(|l| matches_log(l, filter))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(logs
            .into_iter()
            .skip(offset as usize)
            .take(limit.min(usize::MAX as u64) as usize)
            .collect())
    }

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64, StorageError> {
        let inner = self.lock();
        Ok(inner.logs.iter().filter(|l| matches_log(l, filter)).count() as u64)
    }

    async fn update_log(
        &self,
        id: &str,
        update: &LogUpdate,
    ) -> Result<Option<LogRecord>, StorageError> {
        let mut inner = self.lock();
        let Some(record) = inner.logs.iter_mut().find(|l| l.id == id) else {
            return Ok(None);
        };
        if let Some(is_processed) = update.is_processed {
            record.is_processed = is_processed;
        }
        if let Some(attempts) = update.processing_attempts {
            // 单调非减
            record.processing_attempts = record.processing_attempts.max(attempts);
        }
        if let Some(ref metadata) = update.metadata {
            record.metadata = Some(metadata.clone());
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn delete_log(&self, id: &str) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        let before = inner.logs.len();
        inner.logs.retain(|l| l.id != id);
        Ok(inner.logs.len() < before)
    }

    async fn delete_logs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut inner = self.lock();
        let before = inner.logs.len();
        let removed_fingerprints: Vec<Uuid> = inner
            .logs
            .iter()
            .filter(|l| l.created_at < cutoff)
            .map(|l| l.fingerprint)
            .collect();
        inner.logs.retain(|l| l.created_at >= cutoff);
        for fp in removed_fingerprints {
            inner.fingerprints.remove(&fp);
        }
        Ok((before - inner.logs.len()) as u64)
    }

    async fn log_stats(&self) -> Result<LogStats, StorageError> {
        let inner = self.lock();
        let mut by_level: HashMap<String, u64> = HashMap::new();
        let mut by_extension: HashMap<String, u64> = HashMap::new();
        let mut by_session: HashMap<String, u64> = HashMap::new();
        for log in &inner.logs {
            *by_level.entry(log.level.as_str().to_string()).or_insert(0) += 1;
            *by_extension.entry(log.extension_id.clone()).or_insert(0) += 1;
            *by_session.entry(log.session_id.clone()).or_insert(0) += 1;
        }
        Ok(LogStats {
            total: inner.logs.len() as u64,
            by_level,
            by_extension,
            by_session,
        })
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn apply_log(&self, submission: &LogSubmission) -> Result<SessionRecord, StorageError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let record = inner
            .sessions
            .entry(submission.session_id.clone())
            .and_modify(|s| {
                s.total_logs += 1;
                if submission.level == LogLevel::Error {
                    s.error_count += 1;
                }
                if submission.level == LogLevel::Warn {
                    s.warning_count += 1;
                }
                // last_activity只向前移动
                if now > s.last_activity {
                    s.last_activity = now;
                }
                s.updated_at = now;
            })
            .or_insert_with(|| SessionRecord {
                session_id: submission.session_id.clone(),
                extension_id: submission.extension_id.clone(),
                page_url: submission.page_url.clone(),
                page_title: submission.page_title.clone(),
                user_agent: submission.user_agent.clone(),
                referrer: submission.referrer.clone(),
                browser_info: submission.browser_info.clone(),
                is_active: true,
                last_activity: now,
                total_logs: 1,
                error_count: if submission.level == LogLevel::Error { 1 } else { 0 },
                warning_count: if submission.level == LogLevel::Warn { 1 } else { 0 },
                metadata: submission.metadata.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let inner = self.lock();
        Ok(inner.sessions.get(session_id).cloned())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let inner = self.lock();
        let mut sessions: Vec<SessionRecord> = inner
            .sessions
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    async fn find_sessions(
        &self,
        filter: &SessionFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let inner = self.lock();
        let mut sessions: Vec<SessionRecord> = inner
            .sessions
            .values()
            .filter(|s| matches_session(s, filter))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions
            .into_iter()
            .skip(offset as usize)
            .take(limit.min(usize::MAX as u64) as usize)
            .collect())
    }

    async fn count_sessions(&self, filter: &SessionFilter) -> Result<u64, StorageError> {
        let inner = self.lock();
        Ok(inner
            .sessions
            .values()
            .filter(|s| matches_session(s, filter))
            .count() as u64)
    }

    async fn touch_activity(&self, session_id: &str) -> Result<bool, StorageError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let Some(session) = inner.sessions.get_mut(session_id) else {
            return Ok(false);
        };
        if now > session.last_activity {
            session.last_activity = now;
        }
        session.updated_at = now;
        Ok(true)
    }

    async fn deactivate_if_active(&self, session_id: &str) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        let Some(session) = inner.sessions.get_mut(session_id) else {
            return Ok(false);
        };
        if !session.is_active {
            return Ok(false);
        }
        session.is_active = false;
        session.updated_at = Utc::now();
        Ok(true)
    }

    async fn expired_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.is_active && s.last_activity < cutoff)
            .cloned()
            .collect())
    }

    async fn session_stats(&self) -> Result<SessionStats, StorageError> {
        let inner = self.lock();
        let total = inner.sessions.len() as u64;
        let active = inner.sessions.values().filter(|s| s.is_active).count() as u64;
        let mut by_extension: HashMap<String, u64> = HashMap::new();
        for session in inner.sessions.values() {
            *by_extension.entry(session.extension_id.clone()).or_insert(0) += 1;
        }
        Ok(SessionStats {
            total,
            active,
            inactive: total - active,
            by_extension,
        })
    }
}
