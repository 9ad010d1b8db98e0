//! 缓存服务 - 基础设施层
//!
//! 持有 redis 连接，只暴露"读 / 写 / 删 / 探活"能力，不关心业务含义。
//! 连接失败时由调用方决定是否降级（启动流程会降级为无缓存运行）。

use crate::error::{AppError, AppResult, CacheError};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 连接超时
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 预热记录的缓存键
pub fn prewarm_key(user_id: &str) -> String {
    format!("prewarm:{}", user_id)
}

/// 缓存客户端
///
/// `MultiplexedConnection` 可以廉价 clone，多个请求共享同一条连接，
/// 连接在最后一个 clone 释放后断开
#[derive(Clone)]
pub struct CacheClient {
    url: String,
    connection: MultiplexedConnection,
    /// 与 `connection` 一起 clone，用于统计仍持有连接的句柄数
    handles: Arc<()>,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient").field("url", &self.url).finish()
    }
}

impl CacheClient {
    /// 连接缓存服务并执行一次 PING
    pub async fn connect(url: &str) -> AppResult<Self> {
        info!("正在连接缓存服务: {}", url);

        let client = redis::Client::open(url).map_err(|e| connection_failed(url, e))?;
        let connection = tokio::time::timeout(
            CONNECT_TIMEOUT,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|e| connection_failed(url, e))?
        .map_err(|e| connection_failed(url, e))?;

        let cache = Self {
            url: url.to_string(),
            connection,
            handles: Arc::new(()),
        };
        cache.ping().await?;

        info!("✓ 缓存服务已连接");
        Ok(cache)
    }

    /// 探活
    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::cache_command_failed("PING", e))?;

        if reply != "PONG" {
            return Err(AppError::Cache(CacheError::UnexpectedPong { reply }));
        }
        Ok(())
    }

    /// 读取字符串值
    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| AppError::cache_command_failed(format!("GET {}", key), e))
    }

    /// 写入带过期时间的字符串值
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        debug!("写入缓存: {} (ttl {} 秒)", key, ttl.as_secs());
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::cache_command_failed(format!("SETEX {}", key), e))
    }

    /// 删除键
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::cache_command_failed(format!("DEL {}", key), e))
    }

    /// 释放当前句柄，返回仍共享连接的其他句柄数
    ///
    /// 返回 0 时连接随之断开
    pub async fn close(self) -> usize {
        let remaining = Arc::strong_count(&self.handles) - 1;
        if remaining == 0 {
            info!("🔌 断开缓存服务: {}", self.url);
        } else {
            info!(
                "缓存连接仍被 {} 个句柄持有，将在其释放后断开: {}",
                remaining, self.url
            );
        }
        remaining
    }
}

fn connection_failed(url: &str, source: impl std::error::Error + Send + Sync + 'static) -> AppError {
    AppError::Cache(CacheError::ConnectionFailed {
        url: url.to_string(),
        source: Box::new(source),
    })
}
