//! 配置加载：进程环境配置、采集配置文件、配置指纹。

mod env;
mod fingerprint;
mod logger;
mod provider;

pub use env::AppConfig;
pub use fingerprint::fingerprint;
pub use logger::{LoggerConfig, PollingOptions};
pub use provider::{ConfigProvider, JsonFileConfigProvider, SaveOutcome, StaticConfigProvider};

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("duplicate tag name: {0}")]
    DuplicateTag(String),
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
}
