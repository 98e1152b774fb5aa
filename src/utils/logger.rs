use std::io;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
///
/// 结构化日志,双输出:
/// - 文件层: JSON格式,按天轮转,便于日志分析工具解析
/// - 控制台层: 人类可读格式,便于开发调试
/// - 环境变量控制: RUST_LOG=debug 可调整日志级别
///
/// # 示例日志
/// ```json
/// {
///   "timestamp": "2026-08-31T10:30:45.123Z",
///   "level": "INFO",
///   "target": "console_relay::queue::consumer",
///   "fields": {
///     "日志ID": "a1b2c3",
///     "会话ID": "session-xyz"
///   },
///   "message": "日志已持久化"
/// }
/// ```
pub fn init() -> Result<(), io::Error> {
    let log_dir = "logs";

    // 按天轮转,文件命名: console-relay.2026-08-31.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("console-relay")
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| io::Error::other(e.to_string()))?;

    // 默认INFO级别,可通过RUST_LOG覆盖
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false);

    let console_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_target(true)
        .with_level(true)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(())
}
