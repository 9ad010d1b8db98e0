//! 系统路由：健康检查、缓存预热、指标

use crate::cache::prewarm_key;
use crate::server::auth::AuthenticatedUser;
use crate::server::metrics::WorkerMetrics;
use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// 健康检查响应
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub instance_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

/// `GET /v1/health`
///
/// 进入停止流程后返回 503，让负载均衡尽快摘除本实例
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = if state.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    } else {
        (StatusCode::OK, "ok")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            instance_id: state.config.instance_id.clone(),
        }),
    )
}

/// `POST /v1/prewarm`
///
/// 立即返回 accepted，缓存写入在后台进行
pub async fn prewarm_user_caches(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Json<StatusResponse> {
    match state.cache.clone() {
        Some(cache) => {
            let key = prewarm_key(&user.user_id);
            let value = chrono::Utc::now().to_rfc3339();
            let ttl = Duration::from_secs(state.config.prewarm_ttl_secs);
            tokio::spawn(async move {
                if let Err(e) = cache.set_with_ttl(&key, &value, ttl).await {
                    warn!("写入预热记录失败 ({}): {}", key, e);
                }
            });
        }
        None => debug!("未连接缓存，跳过预热记录: {}", user.user_id),
    }

    Json(StatusResponse {
        status: "accepted".to_string(),
    })
}

/// `GET /v1/metrics`
pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<WorkerMetrics> {
    Json(WorkerMetrics::collect(&state).await)
}
