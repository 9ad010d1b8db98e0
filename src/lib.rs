//! # Render API
//!
//! 文档渲染服务的 HTTP 外壳：进程启动方式、系统路由、缓存与浏览器资源的生命周期。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `cache/` - 持有 redis 连接，只暴露读写能力
//! - `browser/` - 持有无头浏览器，只保证可用
//! - `supervisor/` - 托管本地缓存进程，决定工作线程数
//!
//! ### ② 服务层（Server）
//! - `server/` - 路由、中间件、鉴权与指标
//!
//! ### ③ 编排层（Orchestration）
//! - `app` - 启动、运行、停止的完整生命周期
//!
//! ## 启动方式
//!
//! ```text
//! multi-worker      : WORKERS 个工作线程，TIMEOUT 秒请求超时，端口 8000
//! with-local-cache  : 先启动 redis-server，再以 1 个工作线程运行
//! ```
//!
//! ## 模块结构

pub mod app;
pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod server;
pub mod supervisor;
pub mod utils;

// 重新导出常用类型
pub use app::App;
pub use config::{Config, EnvMode, LaunchMode};
pub use error::{AppError, AppResult};
pub use server::{build_router, AppState};
pub use supervisor::LaunchPlan;
