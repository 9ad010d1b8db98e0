//! 本地缓存进程托管
//!
//! 在 HTTP 服务启动前拉起 `redis-server` 子进程，等待端口可连接后再继续；
//! 服务停止时负责结束该进程。

use crate::error::{AppError, AppResult, SupervisorError};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// 端口探测间隔
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 本地缓存进程
///
/// 职责：
/// - 持有唯一的子进程句柄
/// - 只保证"进程在跑、端口可连"，不关心缓存内容
#[derive(Debug)]
pub struct LocalCacheServer {
    program: String,
    port: u16,
    child: Child,
}

impl LocalCacheServer {
    /// 启动缓存进程并等待端口就绪
    ///
    /// # 参数
    /// - `program`: 可执行文件，通常为 `redis-server`
    /// - `port`: 监听端口（仅绑定 127.0.0.1）
    /// - `ready_timeout`: 等待端口可连接的上限
    pub async fn start(program: &str, port: u16, ready_timeout: Duration) -> AppResult<Self> {
        info!("🗄️ 启动本地缓存进程: {} (端口 {})", program, port);

        // 端口上已有监听者时，连通性探测无法区分它和我们的子进程
        ensure_port_free(port)?;

        let child = Command::new(program)
            .args(server_args(port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::Supervisor(SupervisorError::SpawnFailed {
                    program: program.to_string(),
                    source: Box::new(e),
                })
            })?;

        let mut server = Self {
            program: program.to_string(),
            port,
            child,
        };

        if let Err(e) = server.wait_ready(ready_timeout).await {
            // 未就绪的进程不能留在后台
            let _ = server.child.kill().await;
            return Err(e);
        }

        info!("✓ 本地缓存进程已就绪 (pid {:?})", server.child.id());
        Ok(server)
    }

    /// 监听端口
    pub fn port(&self) -> u16 {
        self.port
    }

    /// 子进程 pid（已退出时为 `None`）
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// 端口可连后确认监听者仍是我们的子进程
    fn ensure_running(&mut self) -> AppResult<()> {
        match self.child.try_wait() {
            Ok(Some(status)) => Err(AppError::Supervisor(SupervisorError::ExitedEarly {
                program: self.program.clone(),
                status: status.to_string(),
            })),
            Ok(None) => Ok(()),
            Err(e) => Err(AppError::Supervisor(SupervisorError::StopFailed {
                program: self.program.clone(),
                source: Box::new(e),
            })),
        }
    }

    async fn wait_ready(&mut self, ready_timeout: Duration) -> AppResult<()> {
        let started = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait().map_err(|e| {
                AppError::Supervisor(SupervisorError::StopFailed {
                    program: self.program.clone(),
                    source: Box::new(e),
                })
            })? {
                return Err(AppError::Supervisor(SupervisorError::ExitedEarly {
                    program: self.program.clone(),
                    status: status.to_string(),
                }));
            }

            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return self.ensure_running();
            }

            if started.elapsed() >= ready_timeout {
                return Err(AppError::Supervisor(SupervisorError::ReadyTimeout {
                    port: self.port,
                    waited_ms: ready_timeout.as_millis() as u64,
                }));
            }

            debug!("等待缓存端口 {} 就绪...", self.port);
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// 停止缓存进程
    pub async fn stop(mut self) -> AppResult<()> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                warn!("本地缓存进程已提前退出: {}", status);
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => warn!("无法查询本地缓存进程状态: {}", e),
        }

        self.child.kill().await.map_err(|e| {
            AppError::Supervisor(SupervisorError::StopFailed {
                program: self.program.clone(),
                source: Box::new(e),
            })
        })?;
        info!("🛑 本地缓存进程已停止");
        Ok(())
    }
}

/// 确认端口当前无人监听
fn ensure_port_free(port: u16) -> AppResult<()> {
    std::net::TcpListener::bind(("127.0.0.1", port))
        .map(drop)
        .map_err(|e| {
            AppError::Supervisor(SupervisorError::PortInUse {
                port,
                source: Box::new(e),
            })
        })
}

/// 缓存进程启动参数：只监听本机、不落盘
pub fn server_args(port: u16) -> Vec<String> {
    vec![
        "--port".to_string(),
        port.to_string(),
        "--bind".to_string(),
        "127.0.0.1".to_string(),
        "--save".to_string(),
        String::new(),
        "--appendonly".to_string(),
        "no".to_string(),
    ]
}
