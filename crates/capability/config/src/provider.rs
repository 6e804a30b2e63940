//! 采集配置来源。

use crate::ConfigError;
use crate::logger::LoggerConfig;
use domain::ConfigFingerprint;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 采集配置来源。
pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<LoggerConfig, ConfigError>;
}

/// `save` 的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// 指纹未变，只覆盖主文件
    Updated,
    /// 指纹变化，另存为带版本号的副本
    Versioned(PathBuf),
}

/// JSON 文件配置（`plc_logger_config.json`）。
#[derive(Debug, Clone)]
pub struct JsonFileConfigProvider {
    path: PathBuf,
}

impl JsonFileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 写回配置文件（格式化 JSON）。
    ///
    /// 指纹与现有文件不同（或文件不存在、无法解析）时，
    /// 同时写出 `<stem>_v<N>.json`，N 从 1 开始取第一个未占用的编号。
    pub fn save(&self, config: &LoggerConfig) -> Result<SaveOutcome, ConfigError> {
        config.validate()?;
        let json =
            serde_json::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let fingerprint = config.fingerprint();
        let previous = self.saved_fingerprint();
        let outcome = if previous.as_ref() == Some(&fingerprint) {
            SaveOutcome::Updated
        } else {
            let versioned = self.next_version_path();
            std::fs::write(&versioned, &json)?;
            info!(
                target: "plc.config",
                path = %versioned.display(),
                fingerprint = %fingerprint,
                previous = previous.as_ref().map(ToString::to_string).unwrap_or_default(),
                "config_version_saved"
            );
            SaveOutcome::Versioned(versioned)
        };
        std::fs::write(&self.path, json)?;
        Ok(outcome)
    }

    fn saved_fingerprint(&self) -> Option<ConfigFingerprint> {
        let json = std::fs::read_to_string(&self.path).ok()?;
        LoggerConfig::from_json(&json)
            .ok()
            .map(|config| config.fingerprint())
    }

    fn next_version_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plc_logger_config".to_string());
        let extension = self
            .path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| "json".to_string());
        (1u32..)
            .map(|n| self.path.with_file_name(format!("{}_v{}.{}", stem, n, extension)))
            .find(|candidate| !candidate.exists())
            .unwrap_or_else(|| self.path.with_extension("bak"))
    }
}

impl ConfigProvider for JsonFileConfigProvider {
    /// 文件不存在时使用默认配置并告警。
    fn load(&self) -> Result<LoggerConfig, ConfigError> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    target: "plc.config",
                    path = %self.path.display(),
                    "config_file_missing_using_defaults"
                );
                return Ok(LoggerConfig::default());
            }
            Err(err) => return Err(ConfigError::Io(err)),
        };
        let config = LoggerConfig::from_json(&json)?;
        info!(
            target: "plc.config",
            path = %self.path.display(),
            tags = config.tags.len(),
            modbus = config.modbus.is_some(),
            ads = config.ads.is_some(),
            "config_loaded"
        );
        Ok(config)
    }
}

/// 内存配置（测试及嵌入使用）。
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: LoggerConfig,
}

impl StaticConfigProvider {
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn load(&self) -> Result<LoggerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}
