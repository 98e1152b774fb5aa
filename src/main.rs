use console_relay::config::AppConfig;
use console_relay::state::AppState;
use console_relay::utils::logger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志系统
    logger::init()?;

    let config = AppConfig::from_env();
    tracing::info!(
        交换机 = %config.queue.exchange_name,
        队列 = %config.queue.queue_name,
        "控制台日志收集服务启动中"
    );

    let state = AppState::init(&config).await?;
    tracing::info!("服务就绪,等待关停信号 (Ctrl+C)");

    tokio::signal::ctrl_c().await?;
    tracing::info!("收到关停信号,开始优雅关停");
    state.shutdown().await;

    Ok(())
}
