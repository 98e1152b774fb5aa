use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::config::AppConfig;
use crate::queue::{LogProcessor, LogProducer, QueueTransport};
use crate::services::{spawn_idle_sweeper, JsonLinesSink, LogQueryService, SessionService};
use crate::storage::{LogStore, MemoryStore, PgStore, SessionStore};

/// 应用全局状态
///
/// 存在即合理: 每个字段代表摄取管道的一个核心能力
/// - transport: 队列传输,写路径的骨架
/// - producer: 日志提交入口
/// - log_query: 日志读路径
/// - sessions: 会话读路径与生命周期
pub struct AppState {
    /// 队列传输: 发布与消费共享的进程级句柄
    pub transport: Arc<QueueTransport>,

    /// 日志生产者: 唯一的摄取提交入口
    pub producer: Arc<LogProducer>,

    /// 日志查询服务: 缓存在前存储在后的读路径
    pub log_query: Arc<LogQueryService>,

    /// 会话服务: 查询、停用、空闲清扫
    pub sessions: Arc<SessionService>,

    /// 消费循环句柄
    consumer_handle: JoinHandle<()>,

    /// 空闲会话清扫任务句柄
    sweeper_handle: JoinHandle<()>,

    /// 后台任务关停令牌
    shutdown: CancellationToken,
}

impl AppState {
    /// 初始化应用状态
    ///
    /// 按配置选择后端: `DATABASE_URL`存在时使用PostgreSQL,否则进程内存储;
    /// `REDIS_URL`存在时使用Redis缓存,否则进程内缓存。
    /// 拓扑声明、消费订阅与清扫任务启动在此一次完成,
    /// 返回的状态即是可服务状态
    ///
    /// # 错误处理
    /// 任何后端初始化失败都导致整个应用无法启动 - 不完整的管道等同于无用
    pub async fn init(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let (log_store, session_store): (Arc<dyn LogStore>, Arc<dyn SessionStore>) =
            match &config.database_url {
                Some(url) => {
                    let store = PgStore::connect(url, config.db_max_connections).await?;
                    store.migrate().await?;
                    let store = Arc::new(store);
                    (store.clone(), store)
                }
                None => {
                    tracing::info!("未配置DATABASE_URL,使用进程内存储");
                    let store = Arc::new(MemoryStore::new());
                    (store.clone(), store)
                }
            };

        let cache: Arc<dyn Cache> = match &config.redis_url {
            Some(url) => Arc::new(RedisCache::new(url)?),
            None => {
                tracing::info!("未配置REDIS_URL,使用进程内缓存");
                Arc::new(MemoryCache::new())
            }
        };

        let transport = Arc::new(QueueTransport::new(&config.queue));
        transport.declare_topology(&config.queue)?;

        let producer = Arc::new(LogProducer::new(
            transport.clone(),
            config.queue.exchange_name.clone(),
            config.queue.routing_key.clone(),
        ));

        let export_sink = Arc::new(JsonLinesSink::new(&config.export_dir));
        let processor = LogProcessor::new(
            log_store.clone(),
            session_store.clone(),
            cache.clone(),
            export_sink,
        );
        let consumer_handle = processor.start(&transport, &config.queue.queue_name)?;

        let log_query = Arc::new(LogQueryService::new(
            log_store,
            cache.clone(),
            config.cache_ttl.clone(),
            config.max_log_page_size,
        ));
        let sessions = Arc::new(SessionService::new(
            session_store,
            cache,
            config.cache_ttl.clone(),
            config.max_session_page_size,
            config.session_expiry_hours,
        ));

        let shutdown = CancellationToken::new();
        let sweeper_handle = spawn_idle_sweeper(
            sessions.clone(),
            config.sweep_interval_secs,
            shutdown.clone(),
        );

        tracing::info!("应用状态初始化完成,摄取管道就绪");
        Ok(Self {
            transport,
            producer,
            log_query,
            sessions,
            consumer_handle,
            sweeper_handle,
            shutdown,
        })
    }

    /// 关停
    ///
    /// 顺序: 先关闭传输停止新消息进入,再取消后台任务,
    /// 最后等待消费循环与清扫任务退出
    pub async fn shutdown(self) {
        self.transport.close();
        self.shutdown.cancel();

        if let Err(e) = self.consumer_handle.await {
            tracing::warn!(错误 = %e, "消费循环退出异常");
        }
        if let Err(e) = self.sweeper_handle.await {
            tracing::warn!(错误 = %e, "清扫任务退出异常");
        }
        tracing::info!("应用已关停");
    }
}
