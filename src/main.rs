use anyhow::{Context, Result};
use render_api::utils::logging;
use render_api::{App, Config, LaunchPlan};

fn main() -> Result<()> {
    // 加载配置（.env → 配置文件 → 环境变量）
    let config = Config::load()?;

    // 初始化日志
    logging::init(&config);

    // 工作线程数由启动方式决定，不能用 #[tokio::main]
    let plan = LaunchPlan::from_config(&config);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(plan.workers)
        .thread_name("render-api-worker")
        .enable_all()
        .build()
        .context("无法创建 tokio 运行时")?;

    // 初始化并运行应用
    runtime.block_on(async { App::initialize(config).await?.run().await })?;

    Ok(())
}
