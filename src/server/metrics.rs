//! 工作进程指标
//!
//! `/v1/metrics` 与生产环境下的定时上报共用同一份快照

use crate::browser::BrowserStatus;
use crate::config::{EnvMode, LaunchMode};
use crate::server::state::AppState;
use crate::utils::memory::current_rss_mb;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// 缓存探活超时
const CACHE_PING_TIMEOUT: Duration = Duration::from_secs(1);

/// 指标快照
#[derive(Debug, Clone, Serialize)]
pub struct WorkerMetrics {
    pub instance_id: String,
    pub pid: u32,
    pub env_mode: EnvMode,
    pub launch_mode: LaunchMode,
    /// 配置的工作线程数
    pub workers: usize,
    /// 运行时实际的工作线程数
    pub runtime_workers: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub requests_in_flight: u64,
    pub requests_failed: u64,
    pub memory_rss_mb: Option<f64>,
    pub cache_connected: bool,
    pub browser: BrowserStatus,
    pub shutting_down: bool,
}

impl WorkerMetrics {
    /// 采集当前快照
    pub async fn collect(state: &AppState) -> Self {
        let cache_connected = match &state.cache {
            Some(cache) => matches!(
                tokio::time::timeout(CACHE_PING_TIMEOUT, cache.ping()).await,
                Ok(Ok(()))
            ),
            None => false,
        };

        Self {
            instance_id: state.config.instance_id.clone(),
            pid: std::process::id(),
            env_mode: state.config.env_mode,
            launch_mode: state.config.launch_mode,
            workers: state.plan.workers,
            runtime_workers: tokio::runtime::Handle::current().metrics().num_workers(),
            started_at: state.started_at,
            uptime_secs: state.uptime().as_secs(),
            requests_total: state.metrics.total(),
            requests_in_flight: state.metrics.in_flight(),
            requests_failed: state.metrics.failed(),
            memory_rss_mb: current_rss_mb().await,
            cache_connected,
            browser: state.browser.status().await,
            shutting_down: state.is_shutting_down(),
        }
    }
}
