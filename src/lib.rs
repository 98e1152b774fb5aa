//! 浏览器控制台日志收集服务
//!
//! 队列化异步摄取管道: 扩展端提交的控制台日志先进入消息队列,
//! 提交方拿到临时回执立即返回;消费者异步落库并维护会话计数,
//! 读路径由短TTL旁路缓存加速。
//!
//! 存在即合理:
//! - `queue`: 写路径骨架 - 发布、缓冲投递、确认与重投
//! - `storage`: 持久化层 - PostgreSQL生产后端 + 进程内测试后端
//! - `cache`: 读路径加速器 - 缓存故障一律降级为未命中
//! - `services`: 业务读路径与生命周期管理
//! - `models`: 数据模型与错误类型
//! - `config` / `state` / `utils`: 配置、应用装配与日志

pub mod cache;
pub mod config;
pub mod models;
pub mod queue;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;
