//! HTTP 中间件
//!
//! 从外到内依次为：旧路径改写 → CORS → 请求日志 → 请求超时

use crate::config::Config;
use crate::server::state::AppState;
use crate::utils::logging::truncate_text;
use axum::{
    extract::{Request, State},
    http::{uri::PathAndQuery, HeaderName, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

/// 单数形式的旧路径前缀 → 当前的复数形式
const LEGACY_PREFIXES: [(&str, &str); 2] = [
    ("/v1/agent-run/", "/v1/agent-runs/"),
    ("/v1/thread/", "/v1/threads/"),
];

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// 日志中路径的最大长度
const MAX_LOGGED_PATH: usize = 200;

/// 计算旧路径改写后的结果，不需要改写时返回 `None`
pub fn rewrite_legacy_path(path: &str) -> Option<String> {
    LEGACY_PREFIXES.iter().find_map(|(legacy, current)| {
        path.strip_prefix(legacy)
            .map(|rest| format!("{}{}", current, rest))
    })
}

/// 在路由匹配之前改写旧路径，查询参数保持不变
pub async fn rewrite_legacy_paths(mut req: Request, next: Next) -> Response {
    if let Some(new_path) = rewrite_legacy_path(req.uri().path()) {
        let path_and_query = match req.uri().query() {
            Some(query) => format!("{}?{}", new_path, query),
            None => new_path,
        };

        match path_and_query.parse::<PathAndQuery>() {
            Ok(pq) => {
                let mut parts = req.uri().clone().into_parts();
                parts.path_and_query = Some(pq);
                match Uri::from_parts(parts) {
                    Ok(uri) => {
                        debug!("路径改写: {} -> {}", req.uri().path(), uri.path());
                        *req.uri_mut() = uri;
                    }
                    Err(e) => warn!("路径改写失败: {}", e),
                }
            }
            Err(e) => warn!("路径改写失败: {}", e),
        }
    }

    next.run(req).await
}

/// 请求日志
///
/// - 每个请求一个 span，携带新生成的 `request_id`
/// - 只有 `>= 400` 的响应以 error 级别输出，其余为 debug
/// - 响应头带回 `x-request-id`
pub async fn log_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = truncate_text(req.uri().path(), MAX_LOGGED_PATH);
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path
    );

    let _in_flight = state.metrics.start_request();
    let started = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;
    let elapsed = started.elapsed().as_secs_f64();

    let status = response.status();
    state.metrics.record_status(status);

    span.in_scope(|| {
        if status.as_u16() >= 400 {
            error!(
                "{} {} | Status: {} | Time: {:.2}s",
                method,
                path,
                status.as_u16(),
                elapsed
            );
        } else {
            debug!(
                "{} {} | Status: {} | Time: {:.2}s",
                method,
                path,
                status.as_u16(),
                elapsed
            );
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

/// CORS 配置
///
/// `*` 时回显请求来源并允许携带凭据，否则只放行列出的来源
pub fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    if config.cors_allows_any_origin() {
        return layer.allow_origin(AllowOrigin::mirror_request());
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("忽略无效的 CORS 来源: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
