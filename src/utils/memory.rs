//! 进程内存采样

use tokio::fs;

/// 读取当前进程常驻内存（MB）
///
/// 仅 Linux 下可用（读取 `/proc/self/status`），其他平台返回 `None`
pub async fn current_rss_mb() -> Option<f64> {
    let status = fs::read_to_string("/proc/self/status").await.ok()?;
    parse_vm_rss_kb(&status).map(|kb| kb as f64 / 1024.0)
}

/// 从 `/proc/<pid>/status` 内容中解析 `VmRSS` 行（单位 kB）
pub fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}
