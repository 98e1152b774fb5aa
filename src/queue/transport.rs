//! 队列传输层
//!
//! 进程内消息代理,提供交换机/队列/绑定拓扑与消息级确认语义:
//! - 拓扑声明是assert风格,重复声明安全;名称只来自配置
//! - `publish`在写缓冲区满时返回`Ok(false)` - 软背压信号,非数据丢失
//! - `consume`逐条顺序处理: 处理成功即ack(终态),失败则nack重投
//! - 重投次数达到上限后消息移入检查队列,不再无限循环消耗吞吐
//! - 不自动重连: 连接重建是显式运维动作,`is_connected`供外部监控

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::models::{ProcessError, QueueError};

/// 一次消息投递
///
/// `redelivered`与`attempts`由传输层维护:
/// 首次投递attempts=1,每次nack重投后递增
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 消息体 (JSON字节)
    pub body: Vec<u8>,
    /// 投递标签,进程内单调递增
    pub delivery_tag: u64,
    /// 是否为重投
    pub redelivered: bool,
    /// 累计投递次数 (含本次)
    pub attempts: u32,
}

/// 检查队列中的消息
///
/// 超过重投上限的消息在此等待人工介入
#[derive(Debug, Clone)]
pub struct ParkedMessage {
    pub body: Vec<u8>,
    pub delivery_tag: u64,
    pub attempts: u32,
    pub parked_at: DateTime<Utc>,
}

/// 消费者回调
///
/// 返回Ok则ack,返回Err则nack并重投
pub type DeliveryHandler =
    Arc<dyn Fn(Delivery) -> BoxFuture<'static, Result<(), ProcessError>> + Send + Sync>;

/// 单个队列的内部状态
struct QueueInner {
    /// 待投递消息,nack重投插回队首
    ready: Mutex<VecDeque<Delivery>>,
    /// 检查队列: 超过重投上限的消息
    parked: Mutex<Vec<ParkedMessage>>,
    /// 新消息到达通知
    notify: Notify,
    /// 每个队列只允许一个订阅,保证逐条顺序处理
    consumer_attached: AtomicBool,
}

impl QueueInner {
    fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            parked: Mutex::new(Vec::new()),
            notify: Notify::new(),
            consumer_attached: AtomicBool::new(false),
        }
    }
}

/// 队列传输
///
/// 发布与消费共享同一个进程级句柄。
/// 所有锁的临界区内不做任何await,锁竞争窗口极短
pub struct QueueTransport {
    exchanges: Mutex<HashSet<String>>,
    /// (交换机, 路由键) -> 队列名
    bindings: Mutex<HashMap<(String, String), String>>,
    queues: Mutex<HashMap<String, Arc<QueueInner>>>,
    connected: AtomicBool,
    delivery_seq: AtomicU64,
    buffer_capacity: usize,
    max_redeliveries: u32,
    redelivery_backoff: Duration,
    shutdown: CancellationToken,
}

impl QueueTransport {
    /// 建立传输
    pub fn new(config: &QueueConfig) -> Self {
        tracing::info!(
            缓冲区容量 = config.buffer_capacity,
            重投上限 = config.max_redeliveries,
            "队列传输已建立"
        );
        Self {
            exchanges: Mutex::new(HashSet::new()),
            bindings: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            delivery_seq: AtomicU64::new(0),
            buffer_capacity: config.buffer_capacity,
            max_redeliveries: config.max_redeliveries,
            redelivery_backoff: Duration::from_millis(config.redelivery_backoff_ms),
            shutdown: CancellationToken::new(),
        }
    }

    /// 声明交换机 (assert风格,幂等)
    pub fn declare_exchange(&self, name: &str) -> Result<(), QueueError> {
        self.ensure_connected()?;
        self.exchanges
            .lock()
            .expect("exchanges锁中毒")
            .insert(name.to_string());
        tracing::debug!(交换机 = %name, "交换机已声明");
        Ok(())
    }

    /// 声明队列 (assert风格,幂等)
    pub fn declare_queue(&self, name: &str) -> Result<(), QueueError> {
        self.ensure_connected()?;
        self.queues
            .lock()
            .expect("queues锁中毒")
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(QueueInner::new()));
        tracing::debug!(队列 = %name, "队列已声明");
        Ok(())
    }

    /// 绑定队列到交换机
    ///
    /// # 错误
    /// 交换机或队列未声明时返回 `QueueError::TopologyError`
    pub fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), QueueError> {
        self.ensure_connected()?;
        if !self
            .exchanges
            .lock()
            .expect("exchanges锁中毒")
            .contains(exchange)
        {
            return Err(QueueError::TopologyError(format!(
                "交换机未声明: {}",
                exchange
            )));
        }
        if !self.queues.lock().expect("queues锁中毒").contains_key(queue) {
            return Err(QueueError::TopologyError(format!("队列未声明: {}", queue)));
        }
        self.bindings.lock().expect("bindings锁中毒").insert(
            (exchange.to_string(), routing_key.to_string()),
            queue.to_string(),
        );
        tracing::info!(
            队列 = %queue,
            交换机 = %exchange,
            路由键 = %routing_key,
            "队列绑定完成"
        );
        Ok(())
    }

    /// 按配置一次性声明完整拓扑
    ///
    /// 一个交换机、一个队列、一条固定路由键绑定。
    /// 启动时调用,重复调用安全
    pub fn declare_topology(&self, config: &QueueConfig) -> Result<(), QueueError> {
        self.declare_exchange(&config.exchange_name)?;
        self.declare_queue(&config.queue_name)?;
        self.bind_queue(
            &config.queue_name,
            &config.exchange_name,
            &config.routing_key,
        )
    }

    /// 发布消息
    ///
    /// # 返回值
    /// - `Ok(true)`: 消息已进入队列缓冲区
    /// - `Ok(false)`: 写缓冲区已满,消息未被接受 - 调用方应视为背压信号
    ///
    /// # 错误
    /// 传输已关闭或交换机未声明时返回错误。
    /// 无匹配绑定的消息按AMQP不可路由语义静默丢弃并返回 `Ok(true)`
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<bool, QueueError> {
        self.ensure_connected()?;
        if !self
            .exchanges
            .lock()
            .expect("exchanges锁中毒")
            .contains(exchange)
        {
            return Err(QueueError::TopologyError(format!(
                "交换机未声明: {}",
                exchange
            )));
        }

        let queue_name = self
            .bindings
            .lock()
            .expect("bindings锁中毒")
            .get(&(exchange.to_string(), routing_key.to_string()))
            .cloned();

        let Some(queue_name) = queue_name else {
            tracing::warn!(
                交换机 = %exchange,
                路由键 = %routing_key,
                "无匹配绑定,消息不可路由,已丢弃"
            );
            return Ok(true);
        };

        let inner = self
            .queues
            .lock()
            .expect("queues锁中毒")
            .get(&queue_name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownQueue(queue_name.clone()))?;

        {
            let mut ready = inner.ready.lock().expect("ready锁中毒");
            if ready.len() >= self.buffer_capacity {
                tracing::warn!(
                    队列 = %queue_name,
                    深度 = ready.len(),
                    "写缓冲区已满,发布被拒绝"
                );
                return Ok(false);
            }
            let tag = self.delivery_seq.fetch_add(1, Ordering::Relaxed) + 1;
            ready.push_back(Delivery {
                body: body.to_vec(),
                delivery_tag: tag,
                redelivered: false,
                attempts: 1,
            });
        }
        inner.notify.notify_one();
        Ok(true)
    }

    /// 订阅队列并启动消费循环
    ///
    /// 单订阅逐条处理: 下一条消息只在当前消息的handler返回
    /// (ack或nack)之后才投递,单消费者在途消息数恒为1。
    ///
    /// 确认协议:
    /// - handler返回Ok → ack,消息永久移出队列
    /// - handler返回Err → nack并重投 (redelivered=true,attempts+1)
    /// - attempts超过重投上限 → 移入检查队列,等待人工介入
    ///
    /// # 错误
    /// 队列未声明或已有消费者时返回错误
    pub fn consume(
        &self,
        queue_name: &str,
        handler: DeliveryHandler,
    ) -> Result<JoinHandle<()>, QueueError> {
        self.ensure_connected()?;
        let inner = self
            .queues
            .lock()
            .expect("queues锁中毒")
            .get(queue_name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownQueue(queue_name.to_string()))?;

        if inner.consumer_attached.swap(true, Ordering::SeqCst) {
            return Err(QueueError::ConsumerAlreadyAttached(queue_name.to_string()));
        }

        let queue_name = queue_name.to_string();
        let token = self.shutdown.clone();
        let max_redeliveries = self.max_redeliveries;
        let backoff = self.redelivery_backoff;

        tracing::info!(队列 = %queue_name, "消费者已订阅");

        let handle = tokio::spawn(async move {
            loop {
                let next = inner.ready.lock().expect("ready锁中毒").pop_front();
                let Some(delivery) = next else {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = inner.notify.notified() => continue,
                    }
                };

                let retry_copy = delivery.clone();
                let tag = delivery.delivery_tag;
                match handler(delivery).await {
                    Ok(()) => {
                        // ack: 消息已在pop时移出,无需额外动作
                        tracing::debug!(投递标签 = tag, 队列 = %queue_name, "消息已确认");
                    }
                    Err(e) => {
                        if retry_copy.attempts > max_redeliveries {
                            tracing::error!(
                                投递标签 = tag,
                                队列 = %queue_name,
                                投递次数 = retry_copy.attempts,
                                错误 = %e,
                                "重投次数超过上限,消息移入检查队列"
                            );
                            inner.parked.lock().expect("parked锁中毒").push(ParkedMessage {
                                body: retry_copy.body,
                                delivery_tag: tag,
                                attempts: retry_copy.attempts,
                                parked_at: Utc::now(),
                            });
                        } else {
                            tracing::warn!(
                                投递标签 = tag,
                                队列 = %queue_name,
                                投递次数 = retry_copy.attempts,
                                错误 = %e,
                                "处理失败,nack重投"
                            );
                            inner.ready.lock().expect("ready锁中毒").push_front(Delivery {
                                redelivered: true,
                                attempts: retry_copy.attempts + 1,
                                ..retry_copy
                            });
                            // 退避,避免持续失败的消息形成热循环
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                        }
                    }
                }
            }
            tracing::info!(队列 = %queue_name, "消费循环已退出");
        });

        Ok(handle)
    }

    /// 当前队列深度 (待投递消息数)
    pub fn queue_depth(&self, queue_name: &str) -> Result<usize, QueueError> {
        let inner = self
            .queues
            .lock()
            .expect("queues锁中毒")
            .get(queue_name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownQueue(queue_name.to_string()))?;
        let depth = inner.ready.lock().expect("ready锁中毒").len();
        Ok(depth)
    }

    /// 检查队列内容 (供人工介入)
    pub fn parked_messages(&self, queue_name: &str) -> Result<Vec<ParkedMessage>, QueueError> {
        let inner = self
            .queues
            .lock()
            .expect("queues锁中毒")
            .get(queue_name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownQueue(queue_name.to_string()))?;
        let parked = inner.parked.lock().expect("parked锁中毒").clone();
        Ok(parked)
    }

    /// 传输是否存活 (供外部监控)
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 显式关闭传输
    ///
    /// 停止所有消费循环,后续publish/consume返回 `ConnectionClosed`。
    /// 不自动重连: 重建传输是显式运维动作
    pub fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.shutdown.cancel();
            tracing::info!("队列传输已关闭");
        }
    }

    fn ensure_connected(&self) -> Result<(), QueueError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(QueueError::ConnectionClosed)
        }
    }
}

impl Drop for QueueTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
