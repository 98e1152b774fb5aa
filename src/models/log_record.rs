//! 日志记录模型
//!
//! 区分三种形态,防止临时标识泄露到持久化查询:
//! - [`LogSubmission`]: 客户端提交的摄取载荷,尚未持久化
//! - [`PendingReceipt`]: 生产者返回的临时回执,显式非持久记录
//! - [`LogRecord`]: 消费者落库后的持久记录,携带存储分配的标识

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 日志级别
///
/// 与浏览器console API的五个方法一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(LogLevel::Log),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(format!("未知日志级别: {}", s)),
        }
    }
}

/// 内容指纹的UUIDv5命名空间
///
/// 固定值,保证同一内容在任何进程中算出相同指纹
const FINGERPRINT_NAMESPACE: Uuid = Uuid::from_u128(0x8f0c_1d5e_9b42_4c7a_a3f6_2e81_d904_7715);

/// 日志提交载荷
///
/// 浏览器扩展上报的一条console事件。
/// 线格式使用camelCase字段名,与既有扩展端保持兼容
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSubmission {
    /// 日志级别
    pub level: LogLevel,
    /// 日志消息
    pub message: String,
    /// 事件发生时间(客户端时钟)
    pub timestamp: DateTime<Utc>,
    /// 会话ID,聚合同一次浏览会话的所有日志
    pub session_id: String,
    /// 页面URL
    pub page_url: String,
    /// 扩展ID
    pub extension_id: String,
    /// 级别原始字符串(扩展端透传)
    #[serde(default)]
    pub log_level: String,
    /// 页面标题
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    /// 用户代理字符串
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// 来源页面
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// 错误堆栈
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// 浏览器信息 (结构化JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_info: Option<serde_json::Value>,
    /// 附加元数据 (结构化JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl LogSubmission {
    /// 校验必填字段
    ///
    /// `session_id`/`page_url`/`extension_id`/`message` 必须非空。
    /// 在生产者入口校验,确保不合法载荷不进入队列
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message不能为空".to_string());
        }
        if self.session_id.trim().is_empty() {
            return Err("sessionId不能为空".to_string());
        }
        if self.page_url.trim().is_empty() {
            return Err("pageUrl不能为空".to_string());
        }
        if self.extension_id.trim().is_empty() {
            return Err("extensionId不能为空".to_string());
        }
        Ok(())
    }

    /// 计算内容指纹
    ///
    /// UUIDv5(命名空间, sessionId|timestamp毫秒|message)。
    /// 消费者以指纹做条件插入: 指纹冲突时静默跳过,
    /// 从而在至少一次投递下限制重复记录的累积
    pub fn fingerprint(&self) -> Uuid {
        let name = format!(
            "{}|{}|{}",
            self.session_id,
            self.timestamp.timestamp_millis(),
            self.message
        );
        Uuid::new_v5(&FINGERPRINT_NAMESPACE, name.as_bytes())
    }
}

/// 持久化日志记录
///
/// 仅由消费者落库产生。`id`与`created_at`/`updated_at`由存储分配
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// 存储分配的记录ID
    pub id: String,
    /// 内容指纹 (幂等键)
    pub fingerprint: Uuid,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub page_url: String,
    pub extension_id: String,
    #[serde(default)]
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// 是否已完成处理 (消费者写入即视为已处理)
    pub is_processed: bool,
    /// 处理尝试次数 (等于投递次数,重投时单调递增)
    pub processing_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogRecord {
    /// 从摄取请求构造持久化记录
    ///
    /// 消费者在落库时调用: 记录即刻标记为已处理,
    /// `processing_attempts`取当次投递的累计次数
    pub fn from_submission(id: String, submission: &LogSubmission, attempts: i32) -> Self {
        let now = Utc::now();
        Self {
            id,
            fingerprint: submission.fingerprint(),
            level: submission.level,
            message: submission.message.clone(),
            timestamp: submission.timestamp,
            session_id: submission.session_id.clone(),
            page_url: submission.page_url.clone(),
            extension_id: submission.extension_id.clone(),
            log_level: submission.log_level.clone(),
            page_title: submission.page_title.clone(),
            user_agent: submission.user_agent.clone(),
            referrer: submission.referrer.clone(),
            stack_trace: submission.stack_trace.clone(),
            browser_info: submission.browser_info.clone(),
            metadata: submission.metadata.clone(),
            is_processed: true,
            processing_attempts: attempts,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 日志记录可更新字段
///
/// 管理路径使用: 仅允许更新处理状态与元数据,
/// 日志内容本身在落库后不可变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogUpdate {
    pub is_processed: Option<bool>,
    pub processing_attempts: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// 临时回执
///
/// 生产者在消息入队后立即返回,不等待持久化。
/// `pending_id`是临时标识,与存储分配的记录ID属于不同类型,
/// 调用方不得将其当作稳定标识使用
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReceipt {
    /// 临时标识,前缀"pending-"明示非持久身份
    pub pending_id: String,
    /// 回显提交的载荷
    pub submission: LogSubmission,
    /// 接受时间 (入队时间,非落库时间)
    pub accepted_at: DateTime<Utc>,
}

impl PendingReceipt {
    pub fn new(submission: LogSubmission) -> Self {
        Self {
            pending_id: format!("pending-{}", Uuid::new_v4()),
            submission,
            accepted_at: Utc::now(),
        }
    }
}

/// 日志查询过滤条件
///
/// 等值过滤 + URL大小写不敏感子串匹配 + 时间范围
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub session_id: Option<String>,
    /// 页面URL子串,大小写不敏感
    pub page_url: Option<String>,
    pub extension_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// 日志聚合统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    pub total: u64,
    pub by_level: std::collections::HashMap<String, u64>,
    pub by_extension: std::collections::HashMap<String, u64>,
    pub by_session: std::collections::HashMap<String, u64>,
}

/// 分页日志查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPage {
    pub logs: Vec<LogRecord>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}
