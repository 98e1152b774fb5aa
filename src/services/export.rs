//! 日志导出
//!
//! 导出是队列驱动的异步操作: 消费者查询出匹配记录后交给导出端。
//! 文件端写JSON Lines格式,一行一条记录,方便流式处理和grep

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::models::{ExportError, ExportFilter, LogRecord};

/// 导出端
///
/// 接收一批已查询出的日志记录并落地。
/// 实现决定落地形式 (文件 / 内存 / 外部系统)
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// 写出一批记录
    ///
    /// # 返回值
    /// 导出产物的标识 (文件路径或其他定位符)
    async fn export(
        &self,
        filter: &ExportFilter,
        records: &[LogRecord],
    ) -> Result<String, ExportError>;
}

/// JSON Lines文件导出端
pub struct JsonLinesSink {
    dir: PathBuf,
}

impl JsonLinesSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ExportSink for JsonLinesSink {
    async fn export(
        &self,
        filter: &ExportFilter,
        records: &[LogRecord],
    ) -> Result<String, ExportError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let filename = match &filter.session_id {
            Some(session_id) => format!(
                "logs-{}-{}.jsonl",
                session_id,
                Utc::now().format("%Y%m%d%H%M%S")
            ),
            None => format!("logs-{}.jsonl", Utc::now().format("%Y%m%d%H%M%S")),
        };
        let path = self.dir.join(filename);

        let mut file = tokio::fs::File::create(&path).await?;
        for record in records {
            let line =
                serde_json::to_vec(record).map_err(|e| ExportError::WriteFailed(e.to_string()))?;
            file.write_all(&line).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;

        let path_str = path.to_string_lossy().to_string();
        tracing::info!(
            导出路径 = %path_str,
            记录数 = records.len(),
            "日志导出完成"
        );
        Ok(path_str)
    }
}

/// 内存导出端 (测试用)
#[derive(Default)]
pub struct MemorySink {
    exports: std::sync::Mutex<Vec<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已完成的导出批次
    pub fn exports(&self) -> Vec<Vec<LogRecord>> {
        self.exports.lock().expect("exports锁中毒").clone()
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn export(
        &self,
        _filter: &ExportFilter,
        records: &[LogRecord],
    ) -> Result<String, ExportError> {
        let mut exports = self.exports.lock().expect("exports锁中毒");
        exports.push(records.to_vec());
        Ok(format!("memory://export/{}", exports.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogLevel, LogSubmission};
    use uuid::Uuid;

    fn sample_record() -> LogRecord {
        let submission = LogSubmission {
            level: LogLevel::Info,
            message: "导出测试".to_string(),
            timestamp: Utc::now(),
            session_id: "session-export".to_string(),
            page_url: "https://example.com".to_string(),
            extension_id: "ext-1".to_string(),
            log_level: "info".to_string(),
            page_title: None,
            user_agent: None,
            referrer: None,
            stack_trace: None,
            browser_info: None,
            metadata: None,
        };
        LogRecord::from_submission(Uuid::new_v4().to_string(), &submission, 1)
    }

    #[tokio::test]
    async fn test_jsonl_file_contains_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("export-test-{}", Uuid::new_v4()));
        let sink = JsonLinesSink::new(&dir);
        let records = vec![sample_record(), sample_record()];

        let path = sink
            .export(&ExportFilter::default(), &records)
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
        for line in content.lines() {
            let parsed: LogRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.message, "导出测试");
        }

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_sink_records_batches() {
        let sink = MemorySink::new();
        sink.export(&ExportFilter::default(), &[sample_record()])
            .await
            .unwrap();
        assert_eq!(sink.exports().len(), 1);
        assert_eq!(sink.exports()[0].len(), 1);
    }
}
