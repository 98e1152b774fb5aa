//! QueueMessage线格式单元测试
//!
//! 覆盖范围:
//! 1. 四种消息类型的type标签与载荷形状
//! 2. camelCase字段命名 (与扩展端/运维脚本兼容)
//! 3. 未知类型标签解析失败

use chrono::{TimeZone, Utc};
use console_relay::models::log_record::LogSubmission;
use console_relay::models::{ExportFilter, LogLevel, QueueMessage};

fn sample_submission() -> LogSubmission {
    LogSubmission {
        level: LogLevel::Error,
        message: "未捕获异常".to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 8, 30, 9, 15, 0).unwrap(),
        session_id: "session-9".to_string(),
        page_url: "https://example.com".to_string(),
        extension_id: "ext-9".to_string(),
        log_level: "error".to_string(),
        page_title: None,
        user_agent: None,
        referrer: None,
        stack_trace: Some("Error: boom\n  at main.js:1".to_string()),
        browser_info: None,
        metadata: None,
    }
}

// ============================================================================
// 1. 序列化: type标签与data载荷
// ============================================================================

#[test]
fn test_create_log_wire_format() {
    let message = QueueMessage::CreateLog(sample_submission());
    let json: serde_json::Value =
        serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();

    assert_eq!(json["type"], "CREATE_LOG");
    assert_eq!(json["data"]["message"], "未捕获异常");
    // camelCase字段命名
    assert_eq!(json["data"]["sessionId"], "session-9");
    assert_eq!(json["data"]["pageUrl"], "https://example.com");
    assert_eq!(json["data"]["extensionId"], "ext-9");
    assert_eq!(json["data"]["stackTrace"], "Error: boom\n  at main.js:1");
}

#[test]
fn test_create_many_logs_wire_format() {
    let message = QueueMessage::CreateManyLogs(vec![sample_submission(), sample_submission()]);
    let json: serde_json::Value =
        serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();

    assert_eq!(json["type"], "CREATE_MANY_LOGS");
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
}

#[test]
fn test_cleanup_wire_format_uses_days_old() {
    let message = QueueMessage::CleanupOldLogs { days_old: 30 };
    let json: serde_json::Value =
        serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();

    assert_eq!(json["type"], "CLEANUP_OLD_LOGS");
    assert_eq!(json["data"]["daysOld"], 30);
}

#[test]
fn test_export_wire_format_omits_unset_fields() {
    let message = QueueMessage::ExportLogs(ExportFilter {
        session_id: Some("session-9".to_string()),
        ..Default::default()
    });
    let json: serde_json::Value =
        serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();

    assert_eq!(json["type"], "EXPORT_LOGS");
    assert_eq!(json["data"]["sessionId"], "session-9");
    // 未设置的过滤字段不出现在线格式里
    assert!(json["data"].get("startDate").is_none());
    assert!(json["data"].get("endDate").is_none());
}

// ============================================================================
// 2. 反序列化: 兼容性与错误场景
// ============================================================================

#[test]
fn test_parse_create_log_from_raw_json() {
    let raw = r#"{
        "type": "CREATE_LOG",
        "data": {
            "level": "warn",
            "message": "弃用警告",
            "timestamp": "2026-08-30T09:15:00Z",
            "sessionId": "session-raw",
            "pageUrl": "https://example.com",
            "extensionId": "ext-raw"
        }
    }"#
    .as_bytes();

    let message = QueueMessage::from_bytes(raw).unwrap();
    match message {
        QueueMessage::CreateLog(submission) => {
            assert_eq!(submission.level, LogLevel::Warn);
            assert_eq!(submission.session_id, "session-raw");
            // 可选字段缺失时取默认
            assert_eq!(submission.log_level, "");
            assert!(submission.page_title.is_none());
        }
        other => panic!("意外的消息类型: {}", other.type_name()),
    }
}

#[test]
fn test_unknown_type_tag_fails_to_parse() {
    let raw = br#"{"type": "DROP_TABLES", "data": {}}"#;
    assert!(QueueMessage::from_bytes(raw).is_err());
}

#[test]
fn test_payload_shape_mismatch_fails_to_parse() {
    // CREATE_MANY_LOGS的data必须是数组
    let raw = r#"{"type": "CREATE_MANY_LOGS", "data": {"message": "不是数组"}}"#.as_bytes();
    assert!(QueueMessage::from_bytes(raw).is_err());
}

#[test]
fn test_round_trip_preserves_content() {
    let message = QueueMessage::CreateLog(sample_submission());
    let parsed = QueueMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();
    match parsed {
        QueueMessage::CreateLog(submission) => {
            assert_eq!(submission.message, "未捕获异常");
            assert_eq!(submission.timestamp, sample_submission().timestamp);
        }
        other => panic!("意外的消息类型: {}", other.type_name()),
    }
}

#[test]
fn test_type_name_matches_wire_tag() {
    assert_eq!(
        QueueMessage::CreateLog(sample_submission()).type_name(),
        "CREATE_LOG"
    );
    assert_eq!(
        QueueMessage::CleanupOldLogs { days_old: 1 }.type_name(),
        "CLEANUP_OLD_LOGS"
    );
}
