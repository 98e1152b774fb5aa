//! Redis缓存实现
//!
//! 生产后端。连接池复用deadpool,TTL由Redis的`SET ... EX`原生承担

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

use crate::models::CacheError;

use super::Cache;

/// Redis缓存
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    /// 初始化Redis连接池
    ///
    /// # 参数
    /// - `redis_url`: Redis连接URL,格式: `redis://host:port` 或 `redis://host:port/db`
    ///
    /// # 错误
    /// 返回 `CacheError::ConnectionFailed` 如果连接池创建失败
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let config = Config::from_url(redis_url);
        let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            tracing::error!(
                Redis连接URL = %redis_url,
                错误 = %e,
                "创建Redis连接池失败"
            );
            CacheError::ConnectionFailed(e.to_string())
        })?;

        tracing::info!(Redis连接URL = %redis_url, "Redis连接池创建成功");
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        // 秒级TTL,至少1秒
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> RedisCache {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        RedisCache::new(&redis_url).expect("创建Redis缓存失败")
    }

    #[tokio::test]
    #[ignore] // 需要运行中的Redis实例
    async fn test_set_get_delete_against_live_redis() {
        let cache = test_cache();
        let key = format!("test:cache:{}", uuid::Uuid::new_v4());

        cache
            .set(&key, b"hello", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(b"hello".to_vec()));

        cache.delete(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // 需要运行中的Redis实例
    async fn test_delete_nonexistent() {
        let cache = test_cache();
        cache.delete("test:cache:missing").await.unwrap();
    }
}
