//! HTTP 服务层
//!
//! ## 路由
//!
//! | 路由 | 说明 |
//! |---|---|
//! | `GET /v1/health` | 健康检查 |
//! | `POST /v1/prewarm` | 预热用户缓存（需要 JWT） |
//! | `GET /v1/metrics` | 工作进程指标 |
//!
//! ## 中间件（从外到内）
//!
//! ```text
//! 旧路径改写（路由匹配之前）
//!     ↓
//! CORS
//!     ↓
//! 请求日志 + 计数
//!     ↓
//! 请求超时（TIMEOUT 秒 → 408）
//!     ↓
//! 路由
//! ```

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod state;

pub use error::ApiError;
pub use metrics::WorkerMetrics;
pub use state::AppState;

use crate::error::{AppError, AppResult, ServerError};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

/// `/v1` 下的系统路由
fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/prewarm", post(handlers::prewarm_user_caches))
        .route("/metrics", get(handlers::metrics_endpoint))
}

/// 构建完整的应用路由
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new().nest("/v1", api_router());
    with_legacy_path_rewrite(apply_layers(routes, state))
}

/// 挂载 CORS、请求日志与超时中间件并注入状态
pub fn apply_layers(routes: Router<AppState>, state: AppState) -> Router {
    let cors = middleware::cors_layer(&state.config);
    let timeout =
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, state.config.request_timeout());

    routes
        .layer(timeout)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::log_requests,
        ))
        .layer(cors)
        .with_state(state)
}

/// 在外层路由上改写旧路径
///
/// 挂在内层路由上的中间件运行在路由匹配之后，改写 URI 必须包在外面
pub fn with_legacy_path_rewrite(inner: Router) -> Router {
    Router::new()
        .fallback_service(inner)
        .layer(axum::middleware::from_fn(middleware::rewrite_legacy_paths))
}

/// 在给定监听器上运行服务，直到 `shutdown` 完成并且进行中的请求处理完毕
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| {
            AppError::Server(ServerError::ServeFailed {
                source: Box::new(e),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserPool;
    use crate::config::Config;
    use crate::server::auth::tests::sign;
    use crate::server::handlers::{HealthResponse, StatusResponse};
    use crate::supervisor::LaunchPlan;
    use axum::{
        body::Body,
        extract::Path,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt; // for `collect`
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(config: Config) -> AppState {
        let plan = LaunchPlan::from_config(&config);
        AppState::new(config, plan, None, BrowserPool::disabled())
    }

    fn test_config() -> Config {
        Config {
            instance_id: "test0001".to_string(),
            jwt_secret: Some("test-secret".to_string()),
            ..Config::default()
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("GET")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = build_router(test_state(test_config()));

        let response = app.oneshot(get_request("/v1/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body: HealthResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(
            body,
            HealthResponse {
                status: "ok".to_string(),
                instance_id: "test0001".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_health_reports_shutdown() {
        let state = test_state(test_config());
        state.begin_shutdown();
        let app = build_router(state);

        let response = app.oneshot(get_request("/v1/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["status"], "shutting_down");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404_and_counted() {
        let state = test_state(test_config());
        let app = build_router(state.clone());

        let response = app.oneshot(get_request("/v1/nope")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.metrics.total(), 1);
        assert_eq!(state.metrics.failed(), 1);
        assert_eq!(state.metrics.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_health_is_only_under_v1() {
        let app = build_router(test_state(test_config()));
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_prewarm_requires_token() {
        let app = build_router(test_state(test_config()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/prewarm")
                    .method("POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["detail"], "unauthorized");
    }

    #[tokio::test]
    async fn test_prewarm_accepts_valid_token_without_cache() {
        let app = build_router(test_state(test_config()));
        let token = sign("user-7", "test-secret", 600);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/prewarm")
                    .method("POST")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: StatusResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.status, "accepted");
    }

    #[tokio::test]
    async fn test_prewarm_without_secret_is_503() {
        let config = Config {
            jwt_secret: None,
            ..test_config()
        };
        let app = build_router(test_state(config));
        let token = sign("user-7", "test-secret", 600);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/prewarm")
                    .method("POST")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_snapshot() {
        let state = test_state(test_config());
        let app = build_router(state);

        let response = app.oneshot(get_request("/v1/metrics")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["instance_id"], "test0001");
        assert_eq!(json["workers"], 4);
        assert_eq!(json["launch_mode"], "multi-worker");
        assert_eq!(json["cache_connected"], false);
        assert_eq!(json["browser"]["state"], "disabled");
        // 当前请求自身已计入
        assert_eq!(json["requests_total"], 1);
        assert_eq!(json["requests_in_flight"], 1);
    }

    #[tokio::test]
    async fn test_legacy_paths_are_rewritten_before_routing() {
        async fn show_thread(Path(id): Path<String>) -> String {
            format!("thread {}", id)
        }

        let state = test_state(test_config());
        let routes = Router::new().route("/v1/threads/{id}", get(show_thread));
        let app = with_legacy_path_rewrite(apply_layers(routes, state));

        let response = app
            .clone()
            .oneshot(get_request("/v1/thread/abc?include=messages"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"thread abc");

        let response = app.oneshot(get_request("/v1/threads/xyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out() {
        async fn slow() -> &'static str {
            tokio::time::sleep(Duration::from_secs(600)).await;
            "done"
        }

        let state = test_state(test_config());
        let routes = Router::new().route("/slow", get(slow));
        let app = apply_layers(routes, state.clone());

        let response = app.oneshot(get_request("/slow")).await.unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(state.metrics.failed(), 1);
    }

    #[tokio::test]
    async fn test_cors_mirrors_origin_with_credentials() {
        let app = build_router(test_state(test_config()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/health")
                    .method(Method::OPTIONS)
                    .header(header::ORIGIN, "https://app.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_cors_restricted_origin_list() {
        let config = Config {
            cors_allowed_origins: vec!["https://allowed.example".to_string()],
            ..test_config()
        };
        let app = build_router(test_state(config));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/health")
                    .header(header::ORIGIN, "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
