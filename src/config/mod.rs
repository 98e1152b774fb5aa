//! 配置模块
//!
//! 从环境变量(及.env文件)加载运行配置。
//! 队列拓扑名称全部来自配置,从不在运行时派生

use std::env;

/// 队列拓扑与投递配置
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// 交换机名称 (durable direct)
    pub exchange_name: String,
    /// 队列名称 (durable)
    pub queue_name: String,
    /// 路由键 (固定绑定)
    pub routing_key: String,
    /// 每个队列的写缓冲区容量,满时publish返回false (软背压)
    pub buffer_capacity: usize,
    /// 重投上限,超过后消息移入检查队列,不再循环重投
    pub max_redeliveries: u32,
    /// 重投前的退避时间(毫秒),避免失败消息热循环
    pub redelivery_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            exchange_name: "console_logs_exchange".to_string(),
            queue_name: "console_logs_queue".to_string(),
            routing_key: "console.logs".to_string(),
            buffer_capacity: 10_000,
            max_redeliveries: 5,
            redelivery_backoff_ms: 50,
        }
    }
}

/// 缓存TTL配置 (秒)
///
/// TTL保持短暂,即使某次失效被遗漏,陈旧窗口也有界
#[derive(Debug, Clone)]
pub struct CacheTtlConfig {
    /// 单实体键与会话日志键
    pub entity_secs: u64,
    /// 分页列表复合键
    pub listing_secs: u64,
    /// 日志聚合统计键
    pub log_stats_secs: u64,
    /// 会话聚合统计键
    pub session_stats_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            entity_secs: 300,
            listing_secs: 60,
            log_stats_secs: 600,
            session_stats_secs: 300,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub cache_ttl: CacheTtlConfig,
    /// Redis连接URL,未设置时使用进程内缓存
    pub redis_url: Option<String>,
    /// PostgreSQL连接URL,未设置时使用进程内存储
    pub database_url: Option<String>,
    /// 数据库连接池上限
    pub db_max_connections: u32,
    /// 日志分页limit上限
    pub max_log_page_size: u64,
    /// 会话分页limit上限
    pub max_session_page_size: u64,
    /// 会话空闲过期窗口(小时)
    pub session_expiry_hours: i64,
    /// 空闲会话清扫间隔(秒)
    pub sweep_interval_secs: u64,
    /// 导出文件目录
    pub export_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            cache_ttl: CacheTtlConfig::default(),
            redis_url: None,
            database_url: None,
            db_max_connections: 10,
            max_log_page_size: 1000,
            max_session_page_size: 100,
            session_expiry_hours: 24,
            sweep_interval_secs: 300,
            export_dir: "exports".to_string(),
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    ///
    /// 读取环境变量 (缺失时使用默认值):
    /// - `QUEUE_EXCHANGE_NAME` / `QUEUE_NAME` / `QUEUE_ROUTING_KEY`: 队列拓扑
    /// - `QUEUE_BUFFER_CAPACITY` / `QUEUE_MAX_REDELIVERIES`: 投递参数
    /// - `REDIS_URL`: 缓存后端 (可选)
    /// - `DATABASE_URL` / `DB_MAX_CONNECTIONS`: 存储后端 (可选)
    /// - `SESSION_EXPIRY_HOURS` / `SWEEP_INTERVAL_SECS`: 会话清扫
    /// - `EXPORT_DIR`: 导出目录
    pub fn from_env() -> Self {
        // 尝试加载 .env 文件,不存在则静默跳过
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let queue_defaults = QueueConfig::default();

        let queue = QueueConfig {
            exchange_name: env_or("QUEUE_EXCHANGE_NAME", queue_defaults.exchange_name),
            queue_name: env_or("QUEUE_NAME", queue_defaults.queue_name),
            routing_key: env_or("QUEUE_ROUTING_KEY", queue_defaults.routing_key),
            buffer_capacity: env_parsed("QUEUE_BUFFER_CAPACITY", queue_defaults.buffer_capacity),
            max_redeliveries: env_parsed("QUEUE_MAX_REDELIVERIES", queue_defaults.max_redeliveries),
            redelivery_backoff_ms: env_parsed(
                "QUEUE_REDELIVERY_BACKOFF_MS",
                queue_defaults.redelivery_backoff_ms,
            ),
        };

        Self {
            queue,
            cache_ttl: CacheTtlConfig::default(),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            db_max_connections: env_parsed("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            max_log_page_size: defaults.max_log_page_size,
            max_session_page_size: defaults.max_session_page_size,
            session_expiry_hours: env_parsed("SESSION_EXPIRY_HOURS", defaults.session_expiry_hours),
            sweep_interval_secs: env_parsed("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            export_dir: env_or("EXPORT_DIR", defaults.export_dir),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
