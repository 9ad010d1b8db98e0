/// 日志工具模块
///
/// 负责初始化 tracing 订阅器，并提供启动/停止时的日志输出
use crate::config::{Config, EnvMode};
use crate::supervisor::LaunchPlan;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// - `RUST_LOG` 优先，未设置时使用配置中的 `log_level`
/// - 本地模式输出易读格式，其余模式输出 JSON 行
pub fn init(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.env_mode {
        EnvMode::Local => tracing_subscriber::fmt()
            .with_ansi(true)
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init(),
        EnvMode::Staging | EnvMode::Production => tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(env_filter)
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .flatten_event(true)
            .try_init(),
    };

    // 重复初始化（例如测试中）时保留已有订阅器
    if let Err(e) = result {
        eprintln!("日志已初始化，跳过: {}", e);
    }
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, plan: &LaunchPlan) {
    info!("{}", "=".repeat(60));
    info!("🚀 服务启动 - 实例 {}", config.instance_id);
    info!(
        "🌍 部署模式: {} | 启动方式: {}",
        config.env_mode.as_str(),
        config.launch_mode.as_str()
    );
    info!(
        "📊 工作线程: {} | 请求超时: {} 秒",
        plan.workers, config.timeout_secs
    );
    info!("📂 应用根目录: {}", config.app_root.display());
    info!("🔌 监听地址: {}", config.bind_addr());
    info!("{}", "=".repeat(60));
}

/// 记录程序停止信息
pub fn log_shutdown(instance_id: &str, uptime: Duration) {
    info!("\n{}", "=".repeat(60));
    info!("👋 服务已停止 - 实例 {}", instance_id);
    info!(
        "停止时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("⏱️ 运行时长: {} 秒", uptime.as_secs());
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("/v1/health", 20), "/v1/health");
        assert_eq!(truncate_text("/v1/threads/abcdef", 11), "/v1/threads...");
        assert_eq!(truncate_text("预热缓存请求", 2), "预热...");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = Config::default();
        init(&config);
        init(&config);
    }
}
