//! 会话生命周期集成测试
//!
//! 覆盖场景:
//! - 摄取隐式创建会话,计数器随日志累加
//! - 停用单向: 已停用会话收到新日志只累加计数,不复活
//! - 重复停用幂等,不存在的会话报NotFound
//! - 空闲清扫批量停用超过过期窗口的活跃会话
//! - 会话分页与统计

mod common;

use common::{make_submission, make_submission_at, TestPipeline};
use console_relay::models::{LogLevel, QueryError, SessionFilter};

#[tokio::test]
async fn test_ingest_creates_session_implicitly() {
    let pipeline = TestPipeline::default_pipeline();

    pipeline
        .producer
        .submit(make_submission("session-new", "首条日志", LogLevel::Log))
        .unwrap();
    pipeline.drain().await;

    let session = pipeline.sessions.find_by_id("session-new").await.unwrap();
    assert!(session.is_active);
    assert_eq!(session.total_logs, 1);
    assert_eq!(session.extension_id, "ext-test");
}

#[tokio::test]
async fn test_deactivation_is_one_directional() {
    let pipeline = TestPipeline::default_pipeline();

    pipeline
        .producer
        .submit(make_submission_at("session-1", "第一条", LogLevel::Log, 1))
        .unwrap();
    pipeline.drain().await;

    pipeline.sessions.deactivate("session-1").await.unwrap();
    let session = pipeline.sessions.find_by_id("session-1").await.unwrap();
    assert!(!session.is_active);

    // 停用后继续来日志: 计数器累加,但不复活
    pipeline
        .producer
        .submit(make_submission_at("session-1", "迟到日志", LogLevel::Error, 2))
        .unwrap();
    pipeline.drain().await;

    let session = pipeline.sessions.find_by_id("session-1").await.unwrap();
    assert!(!session.is_active);
    assert_eq!(session.total_logs, 2);
    assert_eq!(session.error_count, 1);
}

#[tokio::test]
async fn test_deactivate_is_idempotent() {
    let pipeline = TestPipeline::default_pipeline();

    pipeline
        .producer
        .submit(make_submission("session-1", "m", LogLevel::Log))
        .unwrap();
    pipeline.drain().await;

    pipeline.sessions.deactivate("session-1").await.unwrap();
    // 重复停用: Ok,非错误
    pipeline.sessions.deactivate("session-1").await.unwrap();
}

#[tokio::test]
async fn test_deactivate_missing_session_is_not_found() {
    let pipeline = TestPipeline::default_pipeline();
    let result = pipeline.sessions.deactivate("ghost").await;
    assert!(matches!(result, Err(QueryError::NotFound(_))));
}

#[tokio::test]
async fn test_active_sessions_excludes_deactivated() {
    let pipeline = TestPipeline::default_pipeline();

    pipeline
        .producer
        .submit(make_submission("session-a", "m", LogLevel::Log))
        .unwrap();
    pipeline
        .producer
        .submit(make_submission("session-b", "m2", LogLevel::Log))
        .unwrap();
    pipeline.drain().await;

    pipeline.sessions.deactivate("session-a").await.unwrap();

    let active = pipeline.sessions.active_sessions().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, "session-b");
}

#[tokio::test]
async fn test_idle_sweep_deactivates_expired_sessions() {
    let pipeline = TestPipeline::default_pipeline();

    pipeline
        .producer
        .submit(make_submission("session-idle", "m", LogLevel::Log))
        .unwrap();
    pipeline.drain().await;

    // 把last_activity倒拨到过期窗口之外
    pipeline.store.backdate_session_activity("session-idle", 25);

    let deactivated = pipeline.sessions.sweep_idle().await.unwrap();
    assert_eq!(deactivated, 1);

    let session = pipeline.sessions.find_by_id("session-idle").await.unwrap();
    assert!(!session.is_active);
}

#[tokio::test]
async fn test_idle_sweep_spares_recently_active() {
    let pipeline = TestPipeline::default_pipeline();

    pipeline
        .producer
        .submit(make_submission("session-live", "m", LogLevel::Log))
        .unwrap();
    pipeline.drain().await;

    let deactivated = pipeline.sessions.sweep_idle().await.unwrap();
    assert_eq!(deactivated, 0);

    let session = pipeline.sessions.find_by_id("session-live").await.unwrap();
    assert!(session.is_active);
}

#[tokio::test]
async fn test_session_pagination_clamps_limit() {
    let pipeline = TestPipeline::default_pipeline();

    pipeline
        .producer
        .submit(make_submission("session-1", "m", LogLevel::Log))
        .unwrap();
    pipeline.drain().await;

    // limit=500超过会话上限100,静默收敛
    let page = pipeline
        .sessions
        .find_paginated(&SessionFilter::default(), 1, 500)
        .await
        .unwrap();
    assert_eq!(page.limit, 100);
    assert_eq!(page.total, 1);

    let result = pipeline
        .sessions
        .find_paginated(&SessionFilter::default(), 0, 10)
        .await;
    assert!(matches!(result, Err(QueryError::InvalidPagination(_))));

    // (page-1)*limit 溢出u64: 拒绝而非panic
    let result = pipeline
        .sessions
        .find_paginated(&SessionFilter::default(), u64::MAX, 10)
        .await;
    assert!(matches!(result, Err(QueryError::InvalidPagination(_))));
}

#[tokio::test]
async fn test_session_stats_track_active_and_inactive() {
    let pipeline = TestPipeline::default_pipeline();

    pipeline
        .producer
        .submit(make_submission("session-a", "m", LogLevel::Log))
        .unwrap();
    pipeline
        .producer
        .submit(make_submission("session-b", "m2", LogLevel::Log))
        .unwrap();
    pipeline.drain().await;
    pipeline.sessions.deactivate("session-a").await.unwrap();

    let stats = pipeline.sessions.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.inactive, 1);
    assert_eq!(stats.by_extension.get("ext-test"), Some(&2));
}

#[tokio::test]
async fn test_touch_activity_missing_session_is_not_found() {
    let pipeline = TestPipeline::default_pipeline();
    let result = pipeline.sessions.touch_activity("ghost").await;
    assert!(matches!(result, Err(QueryError::NotFound(_))));
}
