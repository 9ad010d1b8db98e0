//! 启动编排
//!
//! ## 职责
//!
//! - 根据配置决定实际的工作线程数（`LaunchPlan`）
//! - 在 `with-local-cache` 模式下托管本地缓存进程（`LocalCacheServer`）
//!
//! ## 两种启动方式
//!
//! ```text
//! multi-worker      : HTTP 服务（WORKERS 个工作线程，TIMEOUT 秒超时）
//! with-local-cache  : redis-server（后台子进程） → HTTP 服务（1 个工作线程）
//! ```

pub mod local_cache;

pub use local_cache::LocalCacheServer;

use crate::config::{Config, LaunchMode};
use std::time::Duration;

/// 启动计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// 实际使用的工作线程数
    pub workers: usize,
    /// 是否需要先启动本地缓存进程
    pub spawn_local_cache: bool,
    /// 最终使用的缓存地址
    pub cache_url: Option<String>,
}

impl LaunchPlan {
    /// 根据配置生成启动计划
    pub fn from_config(config: &Config) -> Self {
        match config.launch_mode {
            LaunchMode::MultiWorker => Self {
                workers: config.workers,
                spawn_local_cache: false,
                cache_url: config.redis_url.clone(),
            },
            LaunchMode::WithLocalCache => Self {
                workers: 1,
                spawn_local_cache: true,
                cache_url: Some(config.redis_url.clone().unwrap_or_else(|| {
                    format!("redis://127.0.0.1:{}", config.cache_server_port)
                })),
            },
        }
    }

    /// 本地缓存进程就绪等待上限
    pub fn cache_ready_timeout(config: &Config) -> Duration {
        Duration::from_secs(config.cache_server_ready_timeout_secs)
    }
}
