//! 队列传输集成测试
//!
//! 验证传输层的投递契约:
//! - 拓扑声明幂等,未声明即绑定/发布报错
//! - 缓冲区满时publish返回Ok(false),软背压不丢数据
//! - ack终态,nack重投且redelivered置位
//! - 重投超限后消息移入检查队列
//! - 显式关闭后传输不可用,不自动重连

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use console_relay::config::QueueConfig;
use console_relay::models::{ProcessError, QueueError};
use console_relay::queue::{Delivery, DeliveryHandler, QueueTransport};

fn small_queue_config() -> QueueConfig {
    QueueConfig {
        buffer_capacity: 3,
        max_redeliveries: 2,
        redelivery_backoff_ms: 1,
        ..QueueConfig::default()
    }
}

#[test]
fn test_topology_declarations_are_idempotent() {
    let config = QueueConfig::default();
    let transport = QueueTransport::new(&config);

    transport.declare_topology(&config).unwrap();
    // 重复声明安全
    transport.declare_topology(&config).unwrap();
    transport.declare_exchange(&config.exchange_name).unwrap();
    transport.declare_queue(&config.queue_name).unwrap();
}

#[test]
fn test_bind_requires_declared_topology() {
    let config = QueueConfig::default();
    let transport = QueueTransport::new(&config);

    let result = transport.bind_queue(&config.queue_name, &config.exchange_name, "k");
    assert!(matches!(result, Err(QueueError::TopologyError(_))));
}

#[test]
fn test_publish_to_undeclared_exchange_fails() {
    let config = QueueConfig::default();
    let transport = QueueTransport::new(&config);

    let result = transport.publish("ghost_exchange", "k", b"{}");
    assert!(matches!(result, Err(QueueError::TopologyError(_))));
}

#[test]
fn test_unroutable_message_is_dropped_not_error() {
    let config = QueueConfig::default();
    let transport = QueueTransport::new(&config);
    transport.declare_topology(&config).unwrap();

    // 无绑定的路由键: AMQP不可路由语义,丢弃但返回成功
    let accepted = transport
        .publish(&config.exchange_name, "no.such.binding", b"{}")
        .unwrap();
    assert!(accepted);
    assert_eq!(transport.queue_depth(&config.queue_name).unwrap(), 0);
}

#[test]
fn test_full_buffer_rejects_with_false() {
    let config = small_queue_config();
    let transport = QueueTransport::new(&config);
    transport.declare_topology(&config).unwrap();

    for _ in 0..3 {
        let accepted = transport
            .publish(&config.exchange_name, &config.routing_key, b"{}")
            .unwrap();
        assert!(accepted);
    }
    // 第4条: 缓冲区满,拒绝但不报错
    let accepted = transport
        .publish(&config.exchange_name, &config.routing_key, b"{}")
        .unwrap();
    assert!(!accepted);
    // 已入队消息不受影响
    assert_eq!(transport.queue_depth(&config.queue_name).unwrap(), 3);
}

#[tokio::test]
async fn test_ack_removes_message_permanently() {
    let config = QueueConfig::default();
    let transport = QueueTransport::new(&config);
    transport.declare_topology(&config).unwrap();

    let seen = Arc::new(AtomicU32::new(0));
    let seen_in_handler = seen.clone();
    let handler: DeliveryHandler = Arc::new(move |_delivery: Delivery| {
        let seen = seen_in_handler.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    });
    transport.consume(&config.queue_name, handler).unwrap();

    transport
        .publish(&config.exchange_name, &config.routing_key, b"m1")
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(transport.queue_depth(&config.queue_name).unwrap(), 0);
}

#[tokio::test]
async fn test_nack_redelivers_with_flag_until_success() {
    let config = small_queue_config();
    let transport = QueueTransport::new(&config);
    transport.declare_topology(&config).unwrap();

    // 前2次投递失败,第3次成功
    let attempts_seen: Arc<Mutex<Vec<(bool, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let record = attempts_seen.clone();
    let handler: DeliveryHandler = Arc::new(move |delivery: Delivery| {
        let record = record.clone();
        async move {
            let mut seen = record.lock().unwrap();
            seen.push((delivery.redelivered, delivery.attempts));
            if seen.len() < 3 {
                Err(ProcessError::MalformedMessage("人为失败".to_string()))
            } else {
                Ok(())
            }
        }
        .boxed()
    });
    transport.consume(&config.queue_name, handler).unwrap();

    transport
        .publish(&config.exchange_name, &config.routing_key, b"m1")
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let seen = attempts_seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(false, 1), (true, 2), (true, 3)]);
    // 最终ack,未进检查队列
    assert!(transport.parked_messages(&config.queue_name).unwrap().is_empty());
}

#[tokio::test]
async fn test_poison_message_parks_after_redelivery_ceiling() {
    let config = small_queue_config(); // max_redeliveries = 2
    let transport = QueueTransport::new(&config);
    transport.declare_topology(&config).unwrap();

    let seen = Arc::new(AtomicU32::new(0));
    let seen_in_handler = seen.clone();
    let handler: DeliveryHandler = Arc::new(move |_delivery: Delivery| {
        let seen = seen_in_handler.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(ProcessError::MalformedMessage("持续失败".to_string()))
        }
        .boxed()
    });
    transport.consume(&config.queue_name, handler).unwrap();

    transport
        .publish(&config.exchange_name, &config.routing_key, b"poison")
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    // 首投 + 2次重投 = 3次处理,之后移入检查队列
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    let parked = transport.parked_messages(&config.queue_name).unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].body, b"poison");
    assert_eq!(parked[0].attempts, 3);
    assert_eq!(transport.queue_depth(&config.queue_name).unwrap(), 0);
}

#[tokio::test]
async fn test_single_consumer_per_queue() {
    let config = QueueConfig::default();
    let transport = QueueTransport::new(&config);
    transport.declare_topology(&config).unwrap();

    let handler: DeliveryHandler = Arc::new(|_| async { Ok(()) }.boxed());
    transport.consume(&config.queue_name, handler.clone()).unwrap();

    let second = transport.consume(&config.queue_name, handler);
    assert!(matches!(
        second,
        Err(QueueError::ConsumerAlreadyAttached(_))
    ));
}

#[test]
fn test_closed_transport_rejects_operations() {
    let config = QueueConfig::default();
    let transport = QueueTransport::new(&config);
    transport.declare_topology(&config).unwrap();

    assert!(transport.is_connected());
    transport.close();
    assert!(!transport.is_connected());

    let result = transport.publish(&config.exchange_name, &config.routing_key, b"{}");
    assert!(matches!(result, Err(QueueError::ConnectionClosed)));

    // 不自动重连: 关闭是终态
    let result = transport.declare_queue("another");
    assert!(matches!(result, Err(QueueError::ConnectionClosed)));
}
