use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 队列传输相关错误
///
/// 处理与消息队列交互时的各种失败场景。
/// 每个错误都包含足够的上下文信息,帮助调试和恢复。
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum QueueError {
    /// 传输已关闭
    ///
    /// 连接被显式关闭后仍尝试发布或消费。
    /// 重建连接是显式的运维动作,传输层不自动重连
    #[error("队列传输已关闭")]
    ConnectionClosed,

    /// 拓扑声明失败
    ///
    /// 绑定引用了未声明的交换机或队列
    #[error("拓扑错误: {0}")]
    TopologyError(String),

    /// 队列不存在
    ///
    /// 消费请求指向未声明的队列
    #[error("队列未声明: {0}")]
    UnknownQueue(String),

    /// 消费者已存在
    ///
    /// 设计上每个队列只允许一个订阅,保证逐条顺序处理
    #[error("队列 {0} 已有消费者订阅")]
    ConsumerAlreadyAttached(String),
}

/// 生产者相关错误
///
/// 发布失败是唯一对原始调用方同步可见的失败
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ProducerError {
    /// 队列不可用
    ///
    /// 写缓冲区已满(软背压)或传输已关闭。
    /// 生产者从不缓存未发送的消息 - 调用方自行决定是否重试
    #[error("队列不可用: {0}")]
    QueueUnavailable(String),

    /// 提交数据无效
    ///
    /// 必填字段缺失或为空,拒绝进入队列
    #[error("提交数据无效: {0}")]
    InvalidSubmission(String),

    /// 消息序列化失败
    #[error("消息序列化失败: {0}")]
    SerializationFailed(String),
}

/// 消费者处理相关错误
///
/// 处理失败导致nack重投,不会传播回原始HTTP调用方
#[derive(Debug, Error)]
pub enum ProcessError {
    /// 消息体格式错误
    ///
    /// JSON解析失败或类型标签与载荷不匹配
    #[error("消息体格式错误: {0}")]
    MalformedMessage(String),

    /// 批次内所有日志处理失败
    ///
    /// 部分成功的批次仍然ack,只有全军覆没才触发重投
    #[error("批次处理失败: {0}条日志全部失败")]
    BatchFailed(usize),

    /// 存储写入失败
    #[error("存储操作失败: {0}")]
    Storage(#[from] StorageError),

    /// 导出失败
    #[error("日志导出失败: {0}")]
    Export(#[from] ExportError),
}

/// 持久化存储相关错误
///
/// 处理与存储后端(PostgreSQL或内存实现)交互时的失败场景
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum StorageError {
    /// 数据库连接失败
    ///
    /// 无法建立或维持与存储后端的连接
    #[error("存储连接失败: {0}")]
    ConnectionFailed(String),

    /// 查询执行失败
    #[error("存储查询失败: {0}")]
    QueryFailed(String),

    /// 序列化/反序列化失败
    ///
    /// 将数据转换为JSON或从JSON解析失败
    #[error("数据序列化失败: {0}")]
    SerializationError(String),
}

/// 缓存层相关错误
///
/// 缓存是纯优化层: 所有缓存错误在读路径上降级为未命中,
/// 从不作为用户可见错误传播
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum CacheError {
    /// Redis连接失败
    #[error("缓存连接失败: {0}")]
    ConnectionFailed(String),

    /// 缓存命令执行失败
    #[error("缓存命令执行失败: {0}")]
    CommandFailed(String),
}

/// 查询服务相关错误
///
/// 区分"未找到"与瞬时失败: 未找到不重试
#[derive(Debug, Error)]
pub enum QueryError {
    /// 会话或日志不存在
    #[error("未找到: {0}")]
    NotFound(String),

    /// 分页参数无效
    ///
    /// page或limit为0,在到达存储之前拒绝
    #[error("分页参数无效: {0}")]
    InvalidPagination(String),

    /// 存储访问失败
    #[error("存储操作失败: {0}")]
    Storage(#[from] StorageError),
}

/// 导出汇相关错误
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ExportError {
    /// 写入导出文件失败
    #[error("导出写入失败: {0}")]
    WriteFailed(String),
}

/// 实现从sqlx::Error到StorageError的转换
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// 实现从redis::RedisError到CacheError的转换
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_timeout() {
            CacheError::ConnectionFailed(err.to_string())
        } else {
            CacheError::CommandFailed(err.to_string())
        }
    }
}

/// 实现从serde_json::Error到相关错误的转换
impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for ProcessError {
    fn from(err: serde_json::Error) -> Self {
        ProcessError::MalformedMessage(err.to_string())
    }
}

impl From<serde_json::Error> for ProducerError {
    fn from(err: serde_json::Error) -> Self {
        ProducerError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::WriteFailed(err.to_string())
    }
}
