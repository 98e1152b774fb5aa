//! 缓存层
//!
//! 读路径的旁路缓存(cache-aside)。缓存只是加速器:
//! 任何缓存故障降级为未命中,绝不让读请求失败。
//! 写路径(消费者)在持久化成功后删除相关键,下次读取回源重建。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::models::CacheError;

pub mod keys;
pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

/// 字节级缓存后端
///
/// 实现只关心键值与TTL,序列化由上层辅助函数处理
#[async_trait]
pub trait Cache: Send + Sync {
    /// 读取键值,不存在或已过期返回None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// 写入键值并设置TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// 删除键,键不存在不报错
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// 读取并反序列化缓存值
///
/// 缓存故障或反序列化失败都视为未命中,记录警告后回源
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(缓存键 = %key, 错误 = %e, "缓存值反序列化失败,视为未命中");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(缓存键 = %key, 错误 = %e, "缓存读取失败,降级为未命中");
            None
        }
    }
}

/// 序列化并写入缓存
///
/// 写入失败只记录警告,不影响调用方
pub async fn put_json<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(缓存键 = %key, 错误 = %e, "缓存值序列化失败,跳过写入");
            return;
        }
    };
    if let Err(e) = cache.set(key, &bytes, ttl).await {
        tracing::warn!(缓存键 = %key, 错误 = %e, "缓存写入失败,跳过");
    }
}

/// 删除缓存键
///
/// 删除失败只记录警告:键会在TTL到期后自然失效
pub async fn forget(cache: &dyn Cache, key: &str) {
    if let Err(e) = cache.delete(key).await {
        tracing::warn!(缓存键 = %key, 错误 = %e, "缓存删除失败,等待TTL过期");
    }
}
