use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client as RedisClient};
use tracing::info;

use crate::error::{ApiError, ApiResult};

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager> {
    info!("Initializing Redis connection");

    let client = RedisClient::open(redis_url).context("Failed to create Redis client")?;

    let manager = ConnectionManager::new(client)
        .await
        .context("Failed to create Redis connection manager")?;

    // 测试连接
    let mut conn = manager.clone();
    let _pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .context("Failed to ping Redis")?;

    info!("Redis connection initialized successfully");

    Ok(manager)
}

/// 验证码存储。带TTL的外部KV，进程重启或水平扩容后依然有效
#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn set_code(&self, phone: &str, code: &str, ttl_seconds: u64) -> ApiResult<()>;
    async fn get_code(&self, phone: &str) -> ApiResult<Option<String>>;
    async fn delete_code(&self, phone: &str) -> ApiResult<()>;
    /// 发送节流：interval 内同一手机号只允许一次，返回是否放行
    async fn try_throttle(&self, phone: &str, interval_seconds: u64) -> ApiResult<bool>;
}

pub struct RedisCodeStore {
    conn: ConnectionManager,
}

impl RedisCodeStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn code_key(phone: &str) -> String {
        format!("sms:code:{phone}")
    }

    fn throttle_key(phone: &str) -> String {
        format!("sms:throttle:{phone}")
    }
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn set_code(&self, phone: &str, code: &str, ttl_seconds: u64) -> ApiResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(Self::code_key(phone))
            .arg(code)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    async fn get_code(&self, phone: &str) -> ApiResult<Option<String>> {
        let mut conn = self.conn.clone();
        let code: Option<String> = redis::cmd("GET")
            .arg(Self::code_key(phone))
            .query_async(&mut conn)
            .await
            .map_err(ApiError::from)?;
        Ok(code)
    }

    async fn delete_code(&self, phone: &str) -> ApiResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(Self::code_key(phone))
            .query_async(&mut conn)
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    async fn try_throttle(&self, phone: &str, interval_seconds: u64) -> ApiResult<bool> {
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(Self::throttle_key(phone))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(interval_seconds)
            .query_async(&mut conn)
            .await
            .map_err(ApiError::from)?;
        Ok(set.is_some())
    }
}
