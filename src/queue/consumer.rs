//! 日志消费者
//!
//! 队列消息的唯一处理入口。至少一次投递下的正确性由
//! 指纹条件插入保证: 重复投递的消息在存储层变成no-op,
//! 会话计数器只在记录真正新插入时递增,重投永不重复计数。
//!
//! 持久化成功后删除相关缓存键,读路径下次回源重建。
//! 分页缓存键无法逐一枚举,依赖短TTL自然过期

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::FutureExt;

use crate::cache::{self, keys, Cache};
use crate::models::{ExportFilter, LogSubmission, ProcessError, QueueMessage};
use crate::services::export::ExportSink;
use crate::storage::{LogStore, SessionStore};

use super::transport::{Delivery, DeliveryHandler, QueueTransport};

/// 日志消息处理器
///
/// 无状态: 全部状态在存储与缓存后端,处理器可安全克隆
#[derive(Clone)]
pub struct LogProcessor {
    log_store: Arc<dyn LogStore>,
    session_store: Arc<dyn SessionStore>,
    cache: Arc<dyn Cache>,
    export_sink: Arc<dyn ExportSink>,
}

impl LogProcessor {
    pub fn new(
        log_store: Arc<dyn LogStore>,
        session_store: Arc<dyn SessionStore>,
        cache: Arc<dyn Cache>,
        export_sink: Arc<dyn ExportSink>,
    ) -> Self {
        Self {
            log_store,
            session_store,
            cache,
            export_sink,
        }
    }

    /// 订阅队列并启动消费循环
    ///
    /// # 错误
    /// 队列未声明或已有消费者时返回错误
    pub fn start(
        self,
        transport: &QueueTransport,
        queue_name: &str,
    ) -> Result<tokio::task::JoinHandle<()>, crate::models::QueueError> {
        let handler: DeliveryHandler = Arc::new(move |delivery: Delivery| {
            let processor = self.clone();
            async move { processor.handle_delivery(delivery).await }.boxed()
        });
        transport.consume(queue_name, handler)
    }

    /// 处理一次投递
    ///
    /// 返回Ok → ack; 返回Err → nack重投 (传输层负责重投上限)。
    /// 未知类型标签警告后直接ack - 重投不会让未知类型变成已知类型
    pub async fn handle_delivery(&self, delivery: Delivery) -> Result<(), ProcessError> {
        let message = match QueueMessage::from_bytes(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                if let Some(type_tag) = unknown_type_tag(&delivery.body) {
                    tracing::warn!(
                        消息类型 = %type_tag,
                        投递标签 = delivery.delivery_tag,
                        "未知消息类型,直接确认"
                    );
                    return Ok(());
                }
                return Err(ProcessError::MalformedMessage(e.to_string()));
            }
        };

        tracing::debug!(
            消息类型 = message.type_name(),
            投递标签 = delivery.delivery_tag,
            重投 = delivery.redelivered,
            "开始处理队列消息"
        );
        self.handle(message, delivery.attempts).await
    }

    /// 按消息类型分发
    pub async fn handle(&self, message: QueueMessage, attempts: u32) -> Result<(), ProcessError> {
        match message {
            QueueMessage::CreateLog(submission) => {
                self.process_log(&submission, attempts).await?;
                Ok(())
            }
            QueueMessage::CreateManyLogs(submissions) => {
                self.process_batch(&submissions, attempts).await
            }
            QueueMessage::CleanupOldLogs { days_old } => self.cleanup(days_old).await,
            QueueMessage::ExportLogs(filter) => self.export(&filter).await,
        }
    }

    /// 处理单条日志: 幂等插入 + 会话计数 + 缓存失效
    async fn process_log(
        &self,
        submission: &LogSubmission,
        attempts: u32,
    ) -> Result<bool, ProcessError> {
        let attempts = attempts.min(i32::MAX as u32) as i32;
        let inserted = self.log_store.insert_log(submission, attempts).await?;

        let Some(record) = inserted else {
            // 重复投递: 记录已存在,计数器不动
            tracing::debug!(
                会话ID = %submission.session_id,
                指纹 = %submission.fingerprint(),
                "指纹冲突,跳过重复日志"
            );
            return Ok(false);
        };

        let session = self.session_store.apply_log(submission).await?;
        tracing::info!(
            日志ID = %record.id,
            会话ID = %session.session_id,
            级别 = %record.level,
            会话日志总数 = session.total_logs,
            "日志已持久化"
        );

        self.invalidate_log_caches(&submission.session_id).await;
        Ok(true)
    }

    /// 批量处理: 单项失败不中断批次
    ///
    /// 全部失败才nack整条消息;部分成功时ack,
    /// 失败项已记录日志,重投整批会重复处理已成功项(幂等插入兜底)
    async fn process_batch(
        &self,
        submissions: &[LogSubmission],
        attempts: u32,
    ) -> Result<(), ProcessError> {
        if submissions.is_empty() {
            tracing::warn!("收到空批次,直接确认");
            return Ok(());
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for submission in submissions {
            match self.process_log(submission, attempts).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    tracing::error!(
                        会话ID = %submission.session_id,
                        错误 = %e,
                        "批次中单条日志处理失败,继续处理剩余项"
                    );
                }
            }
        }

        tracing::info!(批次大小 = submissions.len(), 成功 = succeeded, 失败 = failed, "批量日志处理完成");

        if succeeded == 0 {
            return Err(ProcessError::BatchFailed(failed));
        }
        Ok(())
    }

    /// 清理过期日志
    async fn cleanup(&self, days_old: i64) -> Result<(), ProcessError> {
        let cutoff = Utc::now() - ChronoDuration::days(days_old.max(0));
        let deleted = self.log_store.delete_logs_older_than(cutoff).await?;
        tracing::info!(保留天数 = days_old, 删除条数 = deleted, "过期日志清理完成");

        if deleted > 0 {
            cache::forget(self.cache.as_ref(), &keys::log_stats()).await;
        }
        Ok(())
    }

    /// 导出日志
    ///
    /// 三种过滤形态: 按会话(时间升序) / 按时间范围 / 全量
    async fn export(&self, filter: &ExportFilter) -> Result<(), ProcessError> {
        let records = match (&filter.session_id, filter.start_date, filter.end_date) {
            (Some(session_id), _, _) => self.log_store.find_by_session(session_id).await?,
            (None, Some(start), Some(end)) => {
                self.log_store.find_by_time_range(start, end).await?
            }
            _ => self.log_store.find_all().await?,
        };

        let destination = self.export_sink.export(filter, &records).await?;
        tracing::info!(
            记录数 = records.len(),
            导出位置 = %destination,
            "日志导出完成"
        );
        Ok(())
    }

    /// 新日志落库后的缓存失效
    ///
    /// 实体键和列表键直接删除;分页键等TTL过期
    async fn invalidate_log_caches(&self, session_id: &str) {
        let cache = self.cache.as_ref();
        cache::forget(cache, &keys::session_logs(session_id)).await;
        cache::forget(cache, &keys::log_stats()).await;
        cache::forget(cache, &keys::session(session_id)).await;
        cache::forget(cache, &keys::sessions_active()).await;
        cache::forget(cache, &keys::session_stats()).await;
    }
}

const KNOWN_TYPES: [&str; 4] = [
    "CREATE_LOG",
    "CREATE_MANY_LOGS",
    "CLEANUP_OLD_LOGS",
    "EXPORT_LOGS",
];

/// 从消息体提取未知的类型标签
///
/// 仅当JSON合法、type字段是字符串且不属于已知类型时返回Some -
/// 这种情况是"未知操作类型"而非"坏消息体",按原有语义确认而不重投。
/// 已知类型但载荷形状错误仍然按坏消息体处理
fn unknown_type_tag(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("type")
        .and_then(|t| t.as_str())
        .filter(|tag| !KNOWN_TYPES.contains(tag))
        .map(str::to_string)
}

