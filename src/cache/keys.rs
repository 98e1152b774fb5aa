//! 缓存键命名
//!
//! 所有缓存键在此集中构造,避免散落的字符串拼接导致失效遗漏

use crate::models::{LogFilter, SessionFilter};

/// 单条日志: `log:{id}`
pub fn log(id: &str) -> String {
    format!("log:{}", id)
}

/// 会话日志列表: `session-logs:{sessionId}`
pub fn session_logs(session_id: &str) -> String {
    format!("session-logs:{}", session_id)
}

/// 全局日志统计: `log-stats`
pub fn log_stats() -> String {
    "log-stats".to_string()
}

/// 活跃会话列表: `sessions:active`
pub fn sessions_active() -> String {
    "sessions:active".to_string()
}

/// 单个会话: `session:{sessionId}`
pub fn session(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// 会话统计: `stats:sessions`
pub fn session_stats() -> String {
    "stats:sessions".to_string()
}

/// 日志分页查询: 过滤条件 + 页码拼进键,条件不同互不干扰
pub fn log_page(filter: &LogFilter, page: u64, limit: u64) -> String {
    format!(
        "logs:page:{}:{}:{}:{}:{}:{}:{}:{}",
        filter.level.map(|l| l.as_str().to_string()).unwrap_or_default(),
        filter.session_id.as_deref().unwrap_or(""),
        filter.page_url.as_deref().unwrap_or(""),
        filter.extension_id.as_deref().unwrap_or(""),
        filter.start.map(|t| t.timestamp_millis().to_string()).unwrap_or_default(),
        filter.end.map(|t| t.timestamp_millis().to_string()).unwrap_or_default(),
        page,
        limit
    )
}

/// 会话分页查询
pub fn session_page(filter: &SessionFilter, page: u64, limit: u64) -> String {
    format!(
        "sessions:page:{}:{}:{}:{}:{}",
        filter.extension_id.as_deref().unwrap_or(""),
        filter.page_url.as_deref().unwrap_or(""),
        filter.is_active.map(|b| b.to_string()).unwrap_or_default(),
        page,
        limit
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLevel;

    #[test]
    fn test_fixed_key_formats() {
        assert_eq!(log("abc"), "log:abc");
        assert_eq!(session_logs("s1"), "session-logs:s1");
        assert_eq!(log_stats(), "log-stats");
        assert_eq!(sessions_active(), "sessions:active");
        assert_eq!(session("s1"), "session:s1");
        assert_eq!(session_stats(), "stats:sessions");
    }

    #[test]
    fn test_distinct_filters_produce_distinct_page_keys() {
        let mut a = LogFilter::default();
        a.level = Some(LogLevel::Error);
        let b = LogFilter::default();
        assert_ne!(log_page(&a, 1, 50), log_page(&b, 1, 50));
        assert_ne!(log_page(&b, 1, 50), log_page(&b, 2, 50));
    }
}
