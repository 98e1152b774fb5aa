//! 日志生产者
//!
//! 职责单一: 把摄取请求包装成队列消息发布出去,立即返回临时回执,
//! 不等待持久化。发布失败(背压或传输关闭)对调用方可见地失败,
//! 生产者从不自行缓存未发送的消息

use std::sync::Arc;

use crate::models::{
    ExportFilter, LogSubmission, PendingReceipt, ProducerError, QueueMessage,
};

use super::transport::QueueTransport;

/// 日志生产者
///
/// 发布是与消费共享同一传输句柄的独立操作,
/// 多个提交可跨任务并发执行
pub struct LogProducer {
    transport: Arc<QueueTransport>,
    exchange: String,
    routing_key: String,
}

impl LogProducer {
    pub fn new(transport: Arc<QueueTransport>, exchange: String, routing_key: String) -> Self {
        Self {
            transport,
            exchange,
            routing_key,
        }
    }

    /// 提交单条日志
    ///
    /// # 返回值
    /// 临时回执: 携带临时标识并回显提交字段,显式非持久记录。
    /// 调用方不得把临时标识当作存储分配的记录ID
    ///
    /// # 错误
    /// - `ProducerError::InvalidSubmission`: 必填字段缺失
    /// - `ProducerError::QueueUnavailable`: 背压或传输关闭 -
    ///   请求应可见地失败,而非静默丢弃
    pub fn submit(&self, submission: LogSubmission) -> Result<PendingReceipt, ProducerError> {
        submission
            .validate()
            .map_err(ProducerError::InvalidSubmission)?;

        let message = QueueMessage::CreateLog(submission.clone());
        self.publish(&message)?;

        let receipt = PendingReceipt::new(submission);
        tracing::debug!(
            临时标识 = %receipt.pending_id,
            会话ID = %receipt.submission.session_id,
            "日志已入队"
        );
        Ok(receipt)
    }

    /// 批量提交日志
    ///
    /// 整个批次打包为一条 `CREATE_MANY_LOGS` 消息。
    /// 批次原子性仅到消息级别: 消费侧单项失败不回滚其他项
    pub fn submit_batch(
        &self,
        submissions: Vec<LogSubmission>,
    ) -> Result<Vec<PendingReceipt>, ProducerError> {
        for submission in &submissions {
            submission
                .validate()
                .map_err(ProducerError::InvalidSubmission)?;
        }

        let message = QueueMessage::CreateManyLogs(submissions.clone());
        self.publish(&message)?;

        let receipts: Vec<PendingReceipt> =
            submissions.into_iter().map(PendingReceipt::new).collect();
        tracing::info!(批次大小 = receipts.len(), "日志批次已入队");
        Ok(receipts)
    }

    /// 请求清理过期日志
    ///
    /// 实际删除由消费者异步执行,本方法只负责入队
    pub fn request_cleanup(&self, days_old: i64) -> Result<(), ProducerError> {
        let message = QueueMessage::CleanupOldLogs { days_old };
        self.publish(&message)?;
        tracing::info!(保留天数 = days_old, "清理任务已入队");
        Ok(())
    }

    /// 请求导出日志
    ///
    /// 实际导出由消费者异步执行并交给导出汇
    pub fn request_export(&self, filter: ExportFilter) -> Result<(), ProducerError> {
        let message = QueueMessage::ExportLogs(filter);
        self.publish(&message)?;
        tracing::info!("导出任务已入队");
        Ok(())
    }

    /// 发布并把背压/传输故障统一映射为 `QueueUnavailable`
    fn publish(&self, message: &QueueMessage) -> Result<(), ProducerError> {
        let bytes = message.to_bytes()?;
        match self
            .transport
            .publish(&self.exchange, &self.routing_key, &bytes)
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(
                    消息类型 = message.type_name(),
                    "写缓冲区已满,提交失败"
                );
                Err(ProducerError::QueueUnavailable(
                    "写缓冲区已满".to_string(),
                ))
            }
            Err(e) => {
                tracing::error!(
                    消息类型 = message.type_name(),
                    错误 = %e,
                    "发布失败,队列不可用"
                );
                Err(ProducerError::QueueUnavailable(e.to_string()))
            }
        }
    }
}
