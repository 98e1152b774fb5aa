//! 测试公共辅助
//!
//! 组装完整的进程内摄取管道: 队列传输 + 生产者 + 消费者 +
//! 内存存储/缓存/导出端。不依赖任何外部服务

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use console_relay::cache::MemoryCache;
use console_relay::config::{AppConfig, CacheTtlConfig, QueueConfig};
use console_relay::models::{LogLevel, LogSubmission};
use console_relay::queue::{LogProcessor, LogProducer, QueueTransport};
use console_relay::services::{LogQueryService, MemorySink, SessionService};
use console_relay::storage::MemoryStore;

/// 进程内测试管道
pub struct TestPipeline {
    pub transport: Arc<QueueTransport>,
    pub producer: LogProducer,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub sink: Arc<MemorySink>,
    pub log_query: LogQueryService,
    pub sessions: SessionService,
    pub queue_name: String,
}

impl TestPipeline {
    /// 组装管道并启动消费循环
    pub fn start(queue_config: QueueConfig) -> Self {
        let config = AppConfig::default();
        let transport = Arc::new(QueueTransport::new(&queue_config));
        transport
            .declare_topology(&queue_config)
            .expect("拓扑声明失败");

        let producer = LogProducer::new(
            transport.clone(),
            queue_config.exchange_name.clone(),
            queue_config.routing_key.clone(),
        );

        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let sink = Arc::new(MemorySink::new());

        let processor = LogProcessor::new(
            store.clone(),
            store.clone(),
            cache.clone(),
            sink.clone(),
        );
        processor
            .start(&transport, &queue_config.queue_name)
            .expect("消费者启动失败");

        let log_query = LogQueryService::new(
            store.clone(),
            cache.clone(),
            CacheTtlConfig::default(),
            config.max_log_page_size,
        );
        let sessions = SessionService::new(
            store.clone(),
            cache.clone(),
            CacheTtlConfig::default(),
            config.max_session_page_size,
            config.session_expiry_hours,
        );

        Self {
            transport,
            producer,
            store,
            cache,
            sink,
            log_query,
            sessions,
            queue_name: queue_config.queue_name,
        }
    }

    /// 默认配置管道
    pub fn default_pipeline() -> Self {
        Self::start(QueueConfig::default())
    }

    /// 等待队列排空 (消费者处理完所有在途消息)
    pub async fn drain(&self) {
        for _ in 0..200 {
            let depth = self
                .transport
                .queue_depth(&self.queue_name)
                .expect("队列深度查询失败");
            if depth == 0 {
                // 深度归零后再让出一次调度,确保最后一条消息的handler完成
                tokio::time::sleep(Duration::from_millis(20)).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("队列在超时时间内未排空");
    }
}

/// 构造测试提交
pub fn make_submission(session_id: &str, message: &str, level: LogLevel) -> LogSubmission {
    LogSubmission {
        level,
        message: message.to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap(),
        session_id: session_id.to_string(),
        page_url: "https://example.com/app".to_string(),
        extension_id: "ext-test".to_string(),
        log_level: level.as_str().to_string(),
        page_title: Some("测试页面".to_string()),
        user_agent: Some("Mozilla/5.0 Test".to_string()),
        referrer: None,
        stack_trace: None,
        browser_info: None,
        metadata: None,
    }
}

/// 构造带自定义时间戳的提交 (不同时间戳产生不同指纹)
pub fn make_submission_at(
    session_id: &str,
    message: &str,
    level: LogLevel,
    minute: u32,
) -> LogSubmission {
    let mut submission = make_submission(session_id, message, level);
    submission.timestamp = Utc.with_ymd_and_hms(2026, 8, 30, 12, minute, 0).unwrap();
    submission
}
