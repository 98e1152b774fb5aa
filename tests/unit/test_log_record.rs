//! 日志模型单元测试
//!
//! 覆盖范围:
//! 1. 提交校验规则 (必填字段)
//! 2. 内容指纹: 确定性与区分度
//! 3. LogLevel序列化与解析
//! 4. 临时回执与持久记录的形态分离

use chrono::{TimeZone, Utc};
use console_relay::models::log_record::{LogSubmission, PendingReceipt};
use console_relay::models::{LogLevel, LogRecord};

fn valid_submission() -> LogSubmission {
    LogSubmission {
        level: LogLevel::Info,
        message: "页面就绪".to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap(),
        session_id: "session-1".to_string(),
        page_url: "https://example.com".to_string(),
        extension_id: "ext-1".to_string(),
        log_level: "info".to_string(),
        page_title: None,
        user_agent: None,
        referrer: None,
        stack_trace: None,
        browser_info: None,
        metadata: None,
    }
}

// ============================================================================
// 1. 校验规则
// ============================================================================

#[test]
fn test_valid_submission_passes() {
    assert!(valid_submission().validate().is_ok());
}

#[test]
fn test_empty_required_fields_rejected() {
    for field in ["message", "session_id", "page_url", "extension_id"] {
        let mut submission = valid_submission();
        match field {
            "message" => submission.message = String::new(),
            "session_id" => submission.session_id = String::new(),
            "page_url" => submission.page_url = String::new(),
            _ => submission.extension_id = String::new(),
        }
        assert!(submission.validate().is_err(), "字段{}为空应当拒绝", field);
    }
}

// ============================================================================
// 2. 内容指纹
// ============================================================================

#[test]
fn test_fingerprint_is_deterministic() {
    let a = valid_submission();
    let b = valid_submission();
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn test_fingerprint_varies_by_identity_fields() {
    let base = valid_submission();

    let mut other_message = valid_submission();
    other_message.message = "另一条消息".to_string();
    assert_ne!(base.fingerprint(), other_message.fingerprint());

    let mut other_session = valid_submission();
    other_session.session_id = "session-2".to_string();
    assert_ne!(base.fingerprint(), other_session.fingerprint());

    let mut other_time = valid_submission();
    other_time.timestamp = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 1).unwrap();
    assert_ne!(base.fingerprint(), other_time.fingerprint());
}

#[test]
fn test_fingerprint_ignores_non_identity_fields() {
    // 指纹只由会话+时间戳+消息决定,其余字段不参与
    let mut decorated = valid_submission();
    decorated.page_title = Some("不同标题".to_string());
    decorated.metadata = Some(serde_json::json!({"k": "v"}));
    assert_eq!(valid_submission().fingerprint(), decorated.fingerprint());
}

// ============================================================================
// 3. LogLevel
// ============================================================================

#[test]
fn test_level_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&LogLevel::Error).unwrap(), "\"error\"");
    assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
    assert_eq!(serde_json::to_string(&LogLevel::Log).unwrap(), "\"log\"");
}

#[test]
fn test_level_parses_from_str() {
    assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
    assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
    assert!("fatal".parse::<LogLevel>().is_err());
}

// ============================================================================
// 4. 临时回执与持久记录
// ============================================================================

#[test]
fn test_pending_receipt_has_pending_prefix() {
    let receipt = PendingReceipt::new(valid_submission());
    assert!(receipt.pending_id.starts_with("pending-"));
    assert_eq!(receipt.submission.message, "页面就绪");
}

#[test]
fn test_pending_ids_are_unique() {
    let a = PendingReceipt::new(valid_submission());
    let b = PendingReceipt::new(valid_submission());
    assert_ne!(a.pending_id, b.pending_id);
}

#[test]
fn test_record_from_submission_marks_processed() {
    let submission = valid_submission();
    let record = LogRecord::from_submission("rec-1".to_string(), &submission, 3);

    assert_eq!(record.id, "rec-1");
    assert_eq!(record.fingerprint, submission.fingerprint());
    assert!(record.is_processed);
    assert_eq!(record.processing_attempts, 3);
    assert_eq!(record.message, submission.message);
}

#[test]
fn test_record_serializes_camel_case() {
    let record = LogRecord::from_submission("rec-1".to_string(), &valid_submission(), 1);
    let json: serde_json::Value = serde_json::to_value(&record).unwrap();

    assert!(json.get("sessionId").is_some());
    assert!(json.get("isProcessed").is_some());
    assert!(json.get("processingAttempts").is_some());
    assert!(json.get("createdAt").is_some());
}
