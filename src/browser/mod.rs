//! 浏览器资源 - 基础设施层
//!
//! 持有唯一的无头浏览器实例，负责启动、探活与关闭。
//! 自动化流程不在此处实现，这里只保证"浏览器可用"。

pub mod connection;
pub mod headless;

pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;

use crate::config::Config;
use chromiumoxide::Browser;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 浏览器启动参数
#[derive(Debug, Clone, Default)]
pub struct BrowserSettings {
    pub enabled: bool,
    pub executable: Option<PathBuf>,
    /// 设置后连接已有浏览器，而不是自行启动
    pub debug_url: Option<String>,
}

impl From<&Config> for BrowserSettings {
    fn from(config: &Config) -> Self {
        Self {
            enabled: config.browser_enabled,
            executable: config.browser_executable.clone(),
            debug_url: config.browser_debug_url.clone(),
        }
    }
}

/// 浏览器状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BrowserStatus {
    /// 未启用
    Disabled,
    /// 可用
    Ready { version: String },
    /// 启用但不可用
    Unavailable { reason: String },
}

/// 浏览器池
///
/// 职责：
/// - 持有 Browser 与事件处理任务
/// - 启动失败时降级为不可用，不影响服务启动
pub struct BrowserPool {
    enabled: bool,
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    failure: Option<String>,
}

impl BrowserPool {
    /// 未启用的浏览器池
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            browser: Mutex::new(None),
            handler_task: Mutex::new(None),
            failure: None,
        }
    }

    /// 按配置启动浏览器
    pub async fn start(settings: &BrowserSettings) -> Self {
        if !settings.enabled {
            info!("浏览器未启用，跳过");
            return Self::disabled();
        }

        let started = match &settings.debug_url {
            Some(url) => connect_to_browser(url).await,
            None => launch_headless_browser(settings.executable.as_deref()).await,
        };

        match started {
            Ok((browser, handler_task)) => {
                info!("✅ 浏览器已就绪");
                Self {
                    enabled: true,
                    browser: Mutex::new(Some(browser)),
                    handler_task: Mutex::new(Some(handler_task)),
                    failure: None,
                }
            }
            Err(e) => {
                warn!("⚠️ 浏览器启动失败，服务将在无浏览器状态下运行: {}", e);
                Self {
                    enabled: true,
                    browser: Mutex::new(None),
                    handler_task: Mutex::new(None),
                    failure: Some(e.to_string()),
                }
            }
        }
    }

    /// 查询浏览器状态
    pub async fn status(&self) -> BrowserStatus {
        if !self.enabled {
            return BrowserStatus::Disabled;
        }

        let guard = self.browser.lock().await;
        match guard.as_ref() {
            Some(browser) => match browser.version().await {
                Ok(version) => BrowserStatus::Ready {
                    version: version.product,
                },
                Err(e) => BrowserStatus::Unavailable {
                    reason: e.to_string(),
                },
            },
            None => BrowserStatus::Unavailable {
                reason: self
                    .failure
                    .clone()
                    .unwrap_or_else(|| "浏览器已关闭".to_string()),
            },
        }
    }

    /// 关闭浏览器
    pub async fn close(&self) {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            info!("🛑 正在关闭浏览器...");
            if let Err(e) = browser.close().await {
                warn!("关闭浏览器失败: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("等待浏览器进程退出失败: {}", e);
            }
        }
        let handler_task = self.handler_task.lock().await.take();
        if let Some(task) = handler_task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_pool_reports_disabled() {
        let pool = BrowserPool::start(&BrowserSettings::default()).await;
        assert_eq!(pool.status().await, BrowserStatus::Disabled);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_debug_url_degrades() {
        let settings = BrowserSettings {
            enabled: true,
            executable: None,
            debug_url: Some("http://127.0.0.1:1".to_string()),
        };
        let pool = BrowserPool::start(&settings).await;

        assert!(matches!(
            pool.status().await,
            BrowserStatus::Unavailable { .. }
        ));
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config {
            browser_enabled: true,
            browser_debug_url: Some("http://localhost:9222".to_string()),
            ..Config::default()
        };
        let settings = BrowserSettings::from(&config);
        assert!(settings.enabled);
        assert_eq!(settings.debug_url.as_deref(), Some("http://localhost:9222"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(BrowserStatus::Ready {
            version: "HeadlessChrome/120".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["version"], "HeadlessChrome/120");
    }

    #[tokio::test]
    #[ignore] // 需要本机安装 Chromium：cargo test -- --ignored
    async fn test_launch_headless_browser() {
        let settings = BrowserSettings {
            enabled: true,
            ..BrowserSettings::default()
        };
        let pool = BrowserPool::start(&settings).await;
        assert!(matches!(pool.status().await, BrowserStatus::Ready { .. }));
        pool.close().await;
    }
}
