//! 队列消息信封
//!
//! 传输层内的JSON线格式: `{"type": "...", "data": ...}`。
//! 载荷形状完全由type标签决定;消息一经发布不可变;
//! 至少一次投递意味着同一消息可能被消费多次,
//! 消费逻辑必须容忍重复投递 (见消费者的指纹条件插入)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::log_record::LogSubmission;

/// 队列消息
///
/// 四种操作类型,与原有扩展端/运维脚本的线格式保持兼容
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum QueueMessage {
    /// 创建单条日志
    #[serde(rename = "CREATE_LOG")]
    CreateLog(LogSubmission),

    /// 批量创建日志
    ///
    /// 批次原子性仅到消息级别: 整个批次是一条队列消息,
    /// 消费侧单项失败不回滚批次内其他项
    #[serde(rename = "CREATE_MANY_LOGS")]
    CreateManyLogs(Vec<LogSubmission>),

    /// 清理过期日志
    #[serde(rename = "CLEANUP_OLD_LOGS")]
    CleanupOldLogs {
        #[serde(rename = "daysOld")]
        days_old: i64,
    },

    /// 导出日志
    #[serde(rename = "EXPORT_LOGS")]
    ExportLogs(ExportFilter),
}

impl QueueMessage {
    /// 序列化为传输字节
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// 从传输字节解析
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// 类型标签 (用于日志)
    pub fn type_name(&self) -> &'static str {
        match self {
            QueueMessage::CreateLog(_) => "CREATE_LOG",
            QueueMessage::CreateManyLogs(_) => "CREATE_MANY_LOGS",
            QueueMessage::CleanupOldLogs { .. } => "CLEANUP_OLD_LOGS",
            QueueMessage::ExportLogs(_) => "EXPORT_LOGS",
        }
    }
}

/// 导出过滤条件
///
/// 三种形态: 按会话 / 按时间范围 / 全量 (全部为None)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}
