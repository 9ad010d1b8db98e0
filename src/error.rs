use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 配置错误
    Config(ConfigError),
    /// 缓存服务错误
    Cache(CacheError),
    /// 浏览器相关错误
    Browser(BrowserError),
    /// 本地缓存进程托管错误
    Supervisor(SupervisorError),
    /// HTTP 服务错误
    Server(ServerError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Cache(e) => write!(f, "缓存错误: {}", e),
            AppError::Browser(e) => write!(f, "浏览器错误: {}", e),
            AppError::Supervisor(e) => write!(f, "进程托管错误: {}", e),
            AppError::Server(e) => write!(f, "服务错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Cache(e) => Some(e),
            AppError::Browser(e) => Some(e),
            AppError::Supervisor(e) => Some(e),
            AppError::Server(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值不合法
    InvalidValue {
        field: String,
        reason: String,
    },
    /// 配置文件读取失败
    FileReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 配置文件解析失败
    FileParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "配置项 {} 不合法: {}", field, reason)
            }
            ConfigError::FileReadFailed { path, source } => {
                write!(f, "读取配置文件失败 ({}): {}", path, source)
            }
            ConfigError::FileParseFailed { path, source } => {
                write!(f, "解析配置文件失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileReadFailed { source, .. }
            | ConfigError::FileParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 缓存服务错误
#[derive(Debug)]
pub enum CacheError {
    /// 连接缓存服务失败
    ConnectionFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 缓存命令执行失败
    CommandFailed {
        command: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// PING 返回了意外结果
    UnexpectedPong {
        reply: String,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::ConnectionFailed { url, source } => {
                write!(f, "无法连接到缓存服务 ({}): {}", url, source)
            }
            CacheError::CommandFailed { command, source } => {
                write!(f, "缓存命令 {} 执行失败: {}", command, source)
            }
            CacheError::UnexpectedPong { reply } => {
                write!(f, "缓存服务 PING 返回意外结果: {}", reply)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::ConnectionFailed { source, .. }
            | CacheError::CommandFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            CacheError::UnexpectedPong { .. } => None,
        }
    }
}

/// 浏览器相关错误
#[derive(Debug)]
pub enum BrowserError {
    /// 连接浏览器失败
    ConnectionFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 启动浏览器失败
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 浏览器配置失败
    ConfigurationFailed {
        reason: String,
    },
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserError::ConnectionFailed { url, source } => {
                write!(f, "无法连接到浏览器 ({}): {}", url, source)
            }
            BrowserError::LaunchFailed { source } => {
                write!(f, "启动无头浏览器失败: {}", source)
            }
            BrowserError::ConfigurationFailed { reason } => {
                write!(f, "浏览器配置失败: {}", reason)
            }
        }
    }
}

impl std::error::Error for BrowserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrowserError::ConnectionFailed { source, .. }
            | BrowserError::LaunchFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            BrowserError::ConfigurationFailed { .. } => None,
        }
    }
}

/// 本地缓存进程托管错误
#[derive(Debug)]
pub enum SupervisorError {
    /// 启动子进程失败
    SpawnFailed {
        program: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 子进程在就绪前退出
    ExitedEarly {
        program: String,
        status: String,
    },
    /// 端口已被其他进程占用
    PortInUse {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 等待端口就绪超时
    ReadyTimeout {
        port: u16,
        waited_ms: u64,
    },
    /// 停止子进程失败
    StopFailed {
        program: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::SpawnFailed { program, source } => {
                write!(f, "无法启动进程 {}: {}", program, source)
            }
            SupervisorError::ExitedEarly { program, status } => {
                write!(f, "进程 {} 在就绪前退出: {}", program, status)
            }
            SupervisorError::PortInUse { port, source } => {
                write!(f, "端口 {} 已被占用: {}", port, source)
            }
            SupervisorError::ReadyTimeout { port, waited_ms } => {
                write!(f, "等待端口 {} 就绪超时 ({} 毫秒)", port, waited_ms)
            }
            SupervisorError::StopFailed { program, source } => {
                write!(f, "停止进程 {} 失败: {}", program, source)
            }
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupervisorError::SpawnFailed { source, .. }
            | SupervisorError::PortInUse { source, .. }
            | SupervisorError::StopFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// HTTP 服务错误
#[derive(Debug)]
pub enum ServerError {
    /// 绑定监听地址失败
    BindFailed {
        addr: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 服务运行期间出错
    ServeFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::BindFailed { addr, source } => {
                write!(f, "无法绑定监听地址 {}: {}", addr, source)
            }
            ServerError::ServeFailed { source } => {
                write!(f, "服务运行失败: {}", source)
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::BindFailed { source, .. } | ServerError::ServeFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== 从常见错误类型转换 ==========

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err)
    }
}

impl From<BrowserError> for AppError {
    fn from(err: BrowserError) -> Self {
        AppError::Browser(err)
    }
}

impl From<SupervisorError> for AppError {
    fn from(err: SupervisorError) -> Self {
        AppError::Supervisor(err)
    }
}

impl From<ServerError> for AppError {
    fn from(err: ServerError) -> Self {
        AppError::Server(err)
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建配置项不合法错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// 创建缓存命令失败错误
    pub fn cache_command_failed(
        command: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Cache(CacheError::CommandFailed {
            command: command.into(),
            source: Box::new(source),
        })
    }

    /// 创建监听地址绑定失败错误
    pub fn bind_failed(
        addr: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Server(ServerError::BindFailed {
            addr: addr.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
