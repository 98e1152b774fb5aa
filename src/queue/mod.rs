//! 消息队列
//!
//! 摄取管道的异步骨架: 生产者发布、传输层缓冲投递、消费者处理。
//! 写路径(队列驱动)与读路径(缓存+存储)在此解耦,
//! 提交方永远不会被存储延迟阻塞

pub mod consumer;
pub mod producer;
pub mod transport;

pub use consumer::LogProcessor;
pub use producer::LogProducer;
pub use transport::{Delivery, DeliveryHandler, ParkedMessage, QueueTransport};
