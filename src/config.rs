//! 程序配置
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//!
//! 1. 内置默认值
//! 2. `CONFIG_FILE` 指向的 TOML 文件（可选）
//! 3. 环境变量（启动前会先加载工作目录下的 `.env`）

use crate::error::{AppError, AppResult, ConfigError};
use crate::utils::instance::generate_instance_id;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// 部署模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    /// 本地开发
    Local,
    /// 预发布
    Staging,
    /// 生产环境
    Production,
}

impl EnvMode {
    /// 获取标准名称
    pub fn as_str(self) -> &'static str {
        match self {
            EnvMode::Local => "local",
            EnvMode::Staging => "staging",
            EnvMode::Production => "production",
        }
    }

    /// 从字符串解析（忽略大小写）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Some(EnvMode::Local),
            "staging" => Some(EnvMode::Staging),
            "production" => Some(EnvMode::Production),
            _ => None,
        }
    }
}

/// 启动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchMode {
    /// 单进程多工作线程
    MultiWorker,
    /// 先在后台启动本地缓存服务，再以单工作线程运行
    WithLocalCache,
}

impl LaunchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchMode::MultiWorker => "multi-worker",
            LaunchMode::WithLocalCache => "with-local-cache",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "multi-worker" => Some(LaunchMode::MultiWorker),
            "with-local-cache" => Some(LaunchMode::WithLocalCache),
            _ => None,
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 部署模式
    pub env_mode: EnvMode,
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 工作线程数
    pub workers: usize,
    /// 单个请求超时（秒）
    pub timeout_secs: u64,
    /// 启动方式
    pub launch_mode: LaunchMode,
    /// 应用根目录
    pub app_root: PathBuf,
    /// 实例 ID
    pub instance_id: String,
    // --- 缓存配置 ---
    pub redis_url: Option<String>,
    pub cache_server_bin: String,
    pub cache_server_port: u16,
    pub cache_server_ready_timeout_secs: u64,
    // --- HTTP 配置 ---
    /// 允许的跨域来源，`*` 表示任意来源
    pub cors_allowed_origins: Vec<String>,
    /// JWT 签名密钥（HS256）
    pub jwt_secret: Option<String>,
    /// 预热记录在缓存中的过期时间（秒）
    pub prewarm_ttl_secs: u64,
    // --- 后台任务 ---
    pub memory_watchdog_interval_secs: u64,
    /// 内存占用告警阈值（MB）
    pub memory_warn_mb: u64,
    pub metrics_publish_interval_secs: u64,
    /// 收到停止信号后的排空等待时间（秒）
    pub shutdown_grace_secs: u64,
    // --- 浏览器配置 ---
    pub browser_enabled: bool,
    pub browser_executable: Option<PathBuf>,
    pub browser_debug_url: Option<String>,
    /// 未设置 `RUST_LOG` 时使用的日志级别
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_mode: EnvMode::Local,
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: 4,
            timeout_secs: 75,
            launch_mode: LaunchMode::MultiWorker,
            app_root: PathBuf::from("."),
            instance_id: generate_instance_id(),
            redis_url: None,
            cache_server_bin: "redis-server".to_string(),
            cache_server_port: 6379,
            cache_server_ready_timeout_secs: 10,
            cors_allowed_origins: vec!["*".to_string()],
            jwt_secret: None,
            prewarm_ttl_secs: 3600,
            memory_watchdog_interval_secs: 60,
            memory_warn_mb: 2048,
            metrics_publish_interval_secs: 60,
            shutdown_grace_secs: 2,
            browser_enabled: false,
            browser_executable: None,
            browser_debug_url: None,
            log_level: "info".to_string(),
        }
    }
}

/// TOML 配置文件，所有字段均可省略
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    env_mode: Option<EnvMode>,
    host: Option<String>,
    port: Option<u16>,
    workers: Option<usize>,
    timeout_secs: Option<u64>,
    launch_mode: Option<LaunchMode>,
    app_root: Option<PathBuf>,
    instance_id: Option<String>,
    redis_url: Option<String>,
    cache_server_bin: Option<String>,
    cache_server_port: Option<u16>,
    cache_server_ready_timeout_secs: Option<u64>,
    cors_allowed_origins: Option<Vec<String>>,
    jwt_secret: Option<String>,
    prewarm_ttl_secs: Option<u64>,
    memory_watchdog_interval_secs: Option<u64>,
    memory_warn_mb: Option<u64>,
    metrics_publish_interval_secs: Option<u64>,
    shutdown_grace_secs: Option<u64>,
    browser_enabled: Option<bool>,
    browser_executable: Option<PathBuf>,
    browser_debug_url: Option<String>,
    log_level: Option<String>,
}

impl Config {
    /// 完整加载流程：`.env` → 默认值 → 配置文件 → 环境变量，最后校验
    pub fn load() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Some(path) = non_empty(std::env::var("CONFIG_FILE").ok()) {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 仅从环境变量构建
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源构建
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(lookup)?;
        Ok(config)
    }

    /// 读取并叠加 TOML 配置文件
    pub fn apply_file(&mut self, path: &Path) -> AppResult<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(ConfigError::FileReadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;
        self.apply_toml_str(&content, &path.display().to_string())
    }

    /// 叠加 TOML 文本
    pub fn apply_toml_str(&mut self, content: &str, origin: &str) -> AppResult<()> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| {
            AppError::Config(ConfigError::FileParseFailed {
                path: origin.to_string(),
                source: Box::new(e),
            })
        })?;

        macro_rules! overlay {
            ($target:ident, $source:ident; $($field:ident),* $(,)?) => {
                $(if let Some(v) = $source.$field { $target.$field = v; })*
            };
        }
        let target = &mut *self;
        overlay!(
            target, file;
            env_mode,
            host,
            port,
            workers,
            timeout_secs,
            launch_mode,
            app_root,
            instance_id,
            cache_server_bin,
            cache_server_port,
            cache_server_ready_timeout_secs,
            cors_allowed_origins,
            prewarm_ttl_secs,
            memory_watchdog_interval_secs,
            memory_warn_mb,
            metrics_publish_interval_secs,
            shutdown_grace_secs,
            browser_enabled,
            log_level,
        );
        if file.redis_url.is_some() {
            self.redis_url = file.redis_url;
        }
        if file.jwt_secret.is_some() {
            self.jwt_secret = file.jwt_secret;
        }
        if file.browser_executable.is_some() {
            self.browser_executable = file.browser_executable;
        }
        if file.browser_debug_url.is_some() {
            self.browser_debug_url = file.browser_debug_url;
        }
        Ok(())
    }

    fn apply_lookup<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(v) = get("ENV_MODE") {
            self.env_mode = EnvMode::parse(&v)
                .ok_or_else(|| parse_failed("ENV_MODE", &v, "local | staging | production"))?;
        }
        if let Some(v) = get("HOST") {
            self.host = v;
        }
        if let Some(v) = get("PORT") {
            self.port = parse_value("PORT", &v, "u16")?;
        }
        if let Some(v) = get("WORKERS") {
            self.workers = parse_value("WORKERS", &v, "usize")?;
        }
        if let Some(v) = get("TIMEOUT") {
            self.timeout_secs = parse_value("TIMEOUT", &v, "u64")?;
        }
        if let Some(v) = get("LAUNCH_MODE") {
            self.launch_mode = LaunchMode::parse(&v).ok_or_else(|| {
                parse_failed("LAUNCH_MODE", &v, "multi-worker | with-local-cache")
            })?;
        }
        // 兼容旧部署中的 PYTHONPATH，只取第一个条目
        if let Some(v) = get("APP_ROOT") {
            self.app_root = PathBuf::from(v);
        } else if let Some(v) = get("PYTHONPATH") {
            if let Some(first) = v.split(':').find(|p| !p.is_empty()) {
                self.app_root = PathBuf::from(first);
            }
        }
        if let Some(v) = get("INSTANCE_ID") {
            self.instance_id = v;
        }
        if let Some(v) = get("REDIS_URL") {
            self.redis_url = Some(v);
        }
        if let Some(v) = get("CACHE_SERVER_BIN") {
            self.cache_server_bin = v;
        }
        if let Some(v) = get("CACHE_SERVER_PORT") {
            self.cache_server_port = parse_value("CACHE_SERVER_PORT", &v, "u16")?;
        }
        if let Some(v) = get("CACHE_SERVER_READY_TIMEOUT") {
            self.cache_server_ready_timeout_secs =
                parse_value("CACHE_SERVER_READY_TIMEOUT", &v, "u64")?;
        }
        if let Some(v) = get("CORS_ALLOWED_ORIGINS") {
            self.cors_allowed_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("JWT_SECRET") {
            self.jwt_secret = Some(v);
        }
        if let Some(v) = get("PREWARM_TTL") {
            self.prewarm_ttl_secs = parse_value("PREWARM_TTL", &v, "u64")?;
        }
        if let Some(v) = get("MEMORY_WATCHDOG_INTERVAL") {
            self.memory_watchdog_interval_secs =
                parse_value("MEMORY_WATCHDOG_INTERVAL", &v, "u64")?;
        }
        if let Some(v) = get("MEMORY_WARN_MB") {
            self.memory_warn_mb = parse_value("MEMORY_WARN_MB", &v, "u64")?;
        }
        if let Some(v) = get("METRICS_PUBLISH_INTERVAL") {
            self.metrics_publish_interval_secs =
                parse_value("METRICS_PUBLISH_INTERVAL", &v, "u64")?;
        }
        if let Some(v) = get("SHUTDOWN_GRACE") {
            self.shutdown_grace_secs = parse_value("SHUTDOWN_GRACE", &v, "u64")?;
        }
        if let Some(v) = get("BROWSER_ENABLED") {
            self.browser_enabled =
                parse_bool(&v).ok_or_else(|| parse_failed("BROWSER_ENABLED", &v, "bool"))?;
        }
        if let Some(v) = get("BROWSER_EXECUTABLE") {
            self.browser_executable = Some(PathBuf::from(v));
        }
        if let Some(v) = get("BROWSER_DEBUG_URL") {
            self.browser_debug_url = Some(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// 校验配置取值
    pub fn validate(&self) -> AppResult<()> {
        if self.workers == 0 {
            return Err(AppError::invalid_config("workers", "至少需要 1 个工作线程"));
        }
        if self.timeout_secs == 0 {
            return Err(AppError::invalid_config("timeout_secs", "请求超时必须大于 0"));
        }
        if self.port == 0 {
            return Err(AppError::invalid_config("port", "端口不能为 0"));
        }
        if self.cache_server_port == 0 {
            return Err(AppError::invalid_config("cache_server_port", "端口不能为 0"));
        }
        if self.memory_watchdog_interval_secs == 0 || self.metrics_publish_interval_secs == 0 {
            return Err(AppError::invalid_config(
                "interval",
                "后台任务间隔必须大于 0",
            ));
        }
        Ok(())
    }

    /// 监听地址，例如 `0.0.0.0:8000`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// 是否允许任意跨域来源
    pub fn cors_allows_any_origin(&self) -> bool {
        self.cors_allowed_origins.iter().any(|o| o == "*")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_value<T: FromStr>(var_name: &str, value: &str, expected_type: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|_| parse_failed(var_name, value, expected_type))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_failed(var_name: &str, value: &str, expected_type: &str) -> AppError {
    AppError::Config(ConfigError::EnvVarParseFailed {
        var_name: var_name.to_string(),
        value: value.to_string(),
        expected_type: expected_type.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_deployment() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.workers, 4);
        assert_eq!(config.timeout_secs, 75);
        assert_eq!(config.launch_mode, LaunchMode::MultiWorker);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert!(config.cors_allows_any_origin());
        assert_eq!(config.instance_id.len(), 8);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ENV_MODE", "Production"),
            ("WORKERS", "8"),
            ("TIMEOUT", "30"),
            ("LAUNCH_MODE", "with_local_cache"),
            ("PYTHONPATH", "/app:/usr/lib"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("BROWSER_ENABLED", "yes"),
            ("INSTANCE_ID", "abc123"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.env_mode, EnvMode::Production);
        assert_eq!(config.workers, 8);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.launch_mode, LaunchMode::WithLocalCache);
        assert_eq!(config.app_root, PathBuf::from("/app"));
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(!config.cors_allows_any_origin());
        assert!(config.browser_enabled);
        assert_eq!(config.instance_id, "abc123");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_app_root_wins_over_pythonpath() {
        let config =
            Config::from_lookup(lookup(&[("APP_ROOT", "/srv"), ("PYTHONPATH", "/app")])).unwrap();
        assert_eq!(config.app_root, PathBuf::from("/srv"));
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let config = Config::from_lookup(lookup(&[("WORKERS", "  "), ("REDIS_URL", "")])).unwrap();
        assert_eq!(config.workers, 4);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_unparseable_value_is_reported() {
        let err = Config::from_lookup(lookup(&[("TIMEOUT", "soon")])).unwrap_err();
        match err {
            AppError::Config(ConfigError::EnvVarParseFailed { var_name, value, .. }) => {
                assert_eq!(var_name, "TIMEOUT");
                assert_eq!(value, "soon");
            }
            other => panic!("意外的错误类型: {}", other),
        }

        assert!(Config::from_lookup(lookup(&[("ENV_MODE", "prod")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BROWSER_ENABLED", "maybe")])).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config::from_lookup(lookup(&[("WORKERS", "0")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_lookup(lookup(&[("TIMEOUT", "0")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_overlay() {
        let mut config = Config::default();
        config
            .apply_toml_str(
                r#"
                env_mode = "staging"
                port = 9000
                launch_mode = "with-local-cache"
                redis_url = "redis://cache:6379"
                cors_allowed_origins = ["https://app.example"]
                "#,
                "inline",
            )
            .unwrap();

        assert_eq!(config.env_mode, EnvMode::Staging);
        assert_eq!(config.port, 9000);
        assert_eq!(config.workers, 4);
        assert_eq!(config.launch_mode, LaunchMode::WithLocalCache);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.cors_allowed_origins, vec!["https://app.example"]);
    }

    #[test]
    fn test_toml_unknown_field_is_rejected() {
        let mut config = Config::default();
        let err = config.apply_toml_str("wokers = 3", "inline").unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::FileParseFailed { .. })
        ));
    }

    #[test]
    fn test_apply_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render-api.toml");
        std::fs::write(&path, "workers = 2\ntimeout_secs = 10\n").unwrap();

        let mut config = Config::default();
        config.apply_file(&path).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.timeout_secs, 10);

        let missing = dir.path().join("missing.toml");
        assert!(config.apply_file(&missing).is_err());
    }
}
