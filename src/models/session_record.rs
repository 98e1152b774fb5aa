//! 会话记录模型
//!
//! 一次浏览会话的聚合视图: 计数器随每条日志递增,
//! `last_activity`只向前移动,`is_active`的true→false转换单向不可逆
//! (重新激活意味着扩展端生成新的sessionId,而非复用旧会话)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话聚合记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// 会话ID,全局唯一
    pub session_id: String,
    pub extension_id: String,
    pub page_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_info: Option<serde_json::Value>,
    /// 是否活跃。只能由true变为false,反向转换被存储层拒绝
    pub is_active: bool,
    /// 最近活动时间,单调向前
    pub last_activity: DateTime<Utc>,
    /// 累计日志条数
    pub total_logs: i64,
    /// 累计error级日志条数
    pub error_count: i64,
    /// 累计warn级日志条数
    pub warning_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 会话查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub extension_id: Option<String>,
    /// 页面URL子串,大小写不敏感
    pub page_url: Option<String>,
    pub is_active: Option<bool>,
}

/// 会话聚合统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub by_extension: std::collections::HashMap<String, u64>,
}

/// 分页会话查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionRecord>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}
