use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "SLATE_CONFIG";

/// 应用配置的根结构。所有字段都有默认值，空文件也是合法配置。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 自动发现配置文件：优先读取环境变量 `SLATE_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 远程控制通道。默认连接本机 11451 端口。
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "RemoteConfig::default_host")]
    pub host: String,
    #[serde(default = "RemoteConfig::default_port")]
    pub port: u16,
    #[serde(default = "RemoteConfig::default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "RemoteConfig::default_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "RemoteConfig::default_max_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "RemoteConfig::default_status_poll_secs")]
    pub status_poll_secs: u64,
    #[serde(default = "RemoteConfig::default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl RemoteConfig {
    pub const DEFAULT_PORT: u16 = 11451;

    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        Self::DEFAULT_PORT
    }

    fn default_true() -> bool {
        true
    }

    fn default_base_delay_ms() -> u64 {
        1_000
    }

    fn default_max_attempts() -> u32 {
        5
    }

    fn default_status_poll_secs() -> u64 {
        5
    }

    fn default_ping_interval_secs() -> u64 {
        30
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    #[inline]
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    #[inline]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs.max(1))
    }

    #[inline]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            auto_reconnect: true,
            reconnect_base_delay_ms: Self::default_base_delay_ms(),
            max_reconnect_attempts: Self::default_max_attempts(),
            status_poll_secs: Self::default_status_poll_secs(),
            ping_interval_secs: Self::default_ping_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_limit")]
    pub limit: usize,
}

impl HistoryConfig {
    fn default_limit() -> usize {
        50
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "EventsConfig::default_capacity")]
    pub queue_capacity: usize,
}

impl EventsConfig {
    fn default_capacity() -> usize {
        100
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontendMode {
    /// 离线回放脚本消息。
    #[default]
    Demo,
    /// 连接远程控制服务。
    Remote,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontendConfig {
    #[serde(default)]
    pub default_mode: FrontendMode,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
