//! 请求间共享的应用状态

use crate::browser::BrowserPool;
use crate::cache::CacheClient;
use crate::config::Config;
use crate::supervisor::LaunchPlan;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 应用状态
///
/// 所有字段都可以廉价 clone，axum 会为每个请求复制一份
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub plan: Arc<LaunchPlan>,
    /// 连接失败时为 `None`，服务降级为无缓存运行
    pub cache: Option<CacheClient>,
    pub browser: Arc<BrowserPool>,
    pub metrics: Arc<RequestMetrics>,
    pub started_at: DateTime<Utc>,
    started: Instant,
    shutting_down: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        config: Config,
        plan: LaunchPlan,
        cache: Option<CacheClient>,
        browser: BrowserPool,
    ) -> Self {
        Self {
            config: Arc::new(config),
            plan: Arc::new(plan),
            cache,
            browser: Arc::new(browser),
            metrics: Arc::new(RequestMetrics::default()),
            started_at: Utc::now(),
            started: Instant::now(),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 标记进入停止流程，此后健康检查返回 503
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// 请求计数
#[derive(Debug, Default)]
pub struct RequestMetrics {
    total: AtomicU64,
    in_flight: AtomicU64,
    failed: AtomicU64,
}

impl RequestMetrics {
    /// 记录请求开始，返回的守卫在释放时减少进行中计数
    pub fn start_request(self: &Arc<Self>) -> InFlightGuard {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: Arc::clone(self),
        }
    }

    /// 记录响应状态，`>= 400` 计为失败
    pub fn record_status(&self, status: StatusCode) {
        if status.as_u16() >= 400 {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// 进行中请求守卫
pub struct InFlightGuard {
    metrics: Arc<RequestMetrics>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard() {
        let metrics = Arc::new(RequestMetrics::default());
        {
            let _a = metrics.start_request();
            let _b = metrics.start_request();
            assert_eq!(metrics.in_flight(), 2);
        }
        assert_eq!(metrics.in_flight(), 0);
        assert_eq!(metrics.total(), 2);
    }

    #[test]
    fn test_failed_counts_client_and_server_errors() {
        let metrics = RequestMetrics::default();
        metrics.record_status(StatusCode::OK);
        metrics.record_status(StatusCode::NOT_FOUND);
        metrics.record_status(StatusCode::REQUEST_TIMEOUT);
        metrics.record_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(metrics.failed(), 3);
    }

    #[test]
    fn test_shutdown_flag_is_shared_between_clones() {
        let config = Config::default();
        let plan = LaunchPlan::from_config(&config);
        let state = AppState::new(config, plan, None, BrowserPool::disabled());
        let clone = state.clone();

        assert!(!clone.is_shutting_down());
        state.begin_shutdown();
        assert!(clone.is_shutting_down());
    }
}
