use std::path::Path;

use crate::error::{AppError, AppResult, BrowserError};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 容器内运行无头浏览器所需的启动参数
pub const HEADLESS_ARGS: [&str; 3] = [
    "--no-sandbox",            // 容器内以非特权用户运行，沙盒不可用
    "--disable-gpu",           // 无头模式下不需要 GPU
    "--disable-dev-shm-usage", // 防止 /dev/shm 空间不足导致崩溃
];

/// 构建无头浏览器配置
///
/// 未指定可执行文件时交由 chromiumoxide 自动查找
pub fn headless_config(executable: Option<&Path>) -> AppResult<BrowserConfig> {
    let mut builder = BrowserConfig::builder().new_headless_mode();
    if let Some(path) = executable {
        builder = builder.chrome_executable(path);
    }

    builder.args(HEADLESS_ARGS.to_vec()).build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        AppError::Browser(BrowserError::ConfigurationFailed { reason: e })
    })
}

/// 启动无头浏览器
///
/// 返回浏览器句柄以及处理 CDP 事件的后台任务
pub async fn launch_headless_browser(
    executable: Option<&Path>,
) -> AppResult<(Browser, JoinHandle<()>)> {
    info!("🚀 启动无头浏览器...");
    debug!("浏览器可执行文件: {:?}", executable);

    let config = headless_config(executable)?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        AppError::Browser(BrowserError::LaunchFailed {
            source: Box::new(e),
        })
    })?;
    debug!("无头浏览器启动成功");

    // 在后台处理浏览器事件
    let handler_task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    Ok((browser, handler_task))
}
