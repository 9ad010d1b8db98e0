use crate::error::{AppError, AppResult, BrowserError};
use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 连接到已在运行的浏览器（远程调试地址）
///
/// # 参数
/// - `debug_url`: 例如 `http://localhost:9222`
pub async fn connect_to_browser(debug_url: &str) -> AppResult<(Browser, JoinHandle<()>)> {
    info!("正在连接到浏览器: {}", debug_url);

    let (browser, mut handler) = Browser::connect(debug_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::Browser(BrowserError::ConnectionFailed {
            url: debug_url.to_string(),
            source: Box::new(e),
        })
    })?;
    debug!("浏览器连接成功");

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
