//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEELINE__*` 覆盖（双下划线表示嵌套，如 `BEELINE__STREAM__ENDPOINT=http://...`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [stream] 段：后端端点、请求字段名与超时
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// 请求体中承载用户输入的字段名
    #[serde(default = "default_input_field")]
    pub input_field: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 两个数据块之间允许的最长静默（秒），0 表示不限制
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// 附加请求头（如 Authorization）
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            input_field: default_input_field(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: 0,
            headers: HashMap::new(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000/workflow/stream".to_string()
}

fn default_input_field() -> String {
    "user_article".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// [retry] 段：断线重连
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// 单次调用最多连接次数（含首次）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    crate::core::recovery::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    1000
}

/// 从 config 目录加载配置，环境变量 BEELINE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEELINE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEELINE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
