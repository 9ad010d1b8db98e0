//! 应用生命周期 - 编排层
//!
//! ## 职责
//!
//! 1. **启动**：本地缓存进程 → 缓存连接 → 浏览器 → 共享状态
//! 2. **运行**：后台任务（内存看门狗、生产环境指标上报）+ HTTP 服务
//! 3. **停止**：标记停止 → 排空等待 → 处理完进行中的请求 → 依次释放资源
//!
//! 除本地缓存进程外，任何依赖启动失败都只记录日志并降级运行。

use crate::browser::{BrowserPool, BrowserSettings};
use crate::cache::CacheClient;
use crate::config::{Config, EnvMode};
use crate::error::{AppError, AppResult};
use crate::server::{self, AppState, WorkerMetrics};
use crate::supervisor::{LaunchPlan, LocalCacheServer};
use crate::utils::logging::{log_shutdown, log_startup};
use crate::utils::memory::current_rss_mb;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    state: AppState,
    local_cache: Option<LocalCacheServer>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        let plan = LaunchPlan::from_config(&config);
        log_startup(&config, &plan);

        // 本地缓存进程是该启动方式的前提，失败直接退出
        let local_cache = if plan.spawn_local_cache {
            Some(
                LocalCacheServer::start(
                    &config.cache_server_bin,
                    config.cache_server_port,
                    LaunchPlan::cache_ready_timeout(&config),
                )
                .await?,
            )
        } else {
            None
        };

        let cache = match plan.cache_url.as_deref() {
            Some(url) => match CacheClient::connect(url).await {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("⚠️ 缓存服务不可用，将在无缓存状态下运行: {}", e);
                    None
                }
            },
            None => {
                info!("未配置缓存服务");
                None
            }
        };

        let browser = BrowserPool::start(&BrowserSettings::from(&config)).await;

        Ok(Self {
            state: AppState::new(config, plan, cache, browser),
            local_cache,
        })
    }

    /// 共享状态
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// 绑定配置的地址并运行，直到收到 Ctrl-C / SIGTERM
    pub async fn run(self) -> AppResult<()> {
        let addr = self.state.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::bind_failed(addr.clone(), e))?;
        info!("✓ 服务已监听: {}", addr);

        self.run_until(listener, shutdown_signal()).await
    }

    /// 在给定监听器上运行，`shutdown` 完成时开始停止流程
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self { state, local_cache } = self;
        let background = spawn_background_tasks(&state);

        let app = server::build_router(state.clone());
        let grace = state.config.shutdown_grace();
        let drain_state = state.clone();
        let drain = async move {
            shutdown.await;
            info!("📴 收到停止信号，{} 秒后停止接收新请求", grace.as_secs());
            drain_state.begin_shutdown();
            tokio::time::sleep(grace).await;
        };

        let served = server::serve(listener, app, drain).await;
        if let Err(e) = &served {
            error!("❌ 服务异常退出: {}", e);
        }

        // ========== 释放资源 ==========
        for task in background {
            task.abort();
        }
        let uptime = state.uptime();
        let AppState {
            config,
            cache,
            browser,
            ..
        } = state;
        if let Some(cache) = cache {
            cache.close().await;
        }
        browser.close().await;
        if let Some(local_cache) = local_cache {
            if let Err(e) = local_cache.stop().await {
                warn!("停止本地缓存进程失败: {}", e);
            }
        }

        log_shutdown(&config.instance_id, uptime);
        served
    }
}

/// 启动后台任务
fn spawn_background_tasks(state: &AppState) -> Vec<JoinHandle<()>> {
    let mut tasks = vec![tokio::spawn(memory_watchdog(
        Duration::from_secs(state.config.memory_watchdog_interval_secs),
        state.config.memory_warn_mb,
    ))];

    if state.config.env_mode == EnvMode::Production {
        tasks.push(tokio::spawn(metrics_publisher(
            state.clone(),
            Duration::from_secs(state.config.metrics_publish_interval_secs),
        )));
    }

    tasks
}

/// 内存看门狗：定期采样常驻内存，超过阈值时告警
async fn memory_watchdog(interval: Duration, warn_mb: u64) {
    let mut ticker = tokio::time::interval(interval);
    // 第一次 tick 立即返回
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Some(rss) = current_rss_mb().await {
            if rss > warn_mb as f64 {
                warn!("⚠️ 内存占用 {:.1} MB 超过阈值 {} MB", rss, warn_mb);
            }
        }
    }
}

/// 指标上报：定期以结构化日志输出指标快照
async fn metrics_publisher(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let snapshot = WorkerMetrics::collect(&state).await;
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!(target: "worker_metrics", metrics = %json, "worker metrics"),
            Err(e) => warn!("序列化指标失败: {}", e),
        }
    }
}

/// 等待 Ctrl-C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听 Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
