//! 进程运行配置（环境变量）。

use crate::ConfigError;
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "plc_logger_config.json";

/// 进程运行配置。
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// 采集配置文件
    pub config_file: PathBuf,
    /// 分区文件目录
    pub data_dir: PathBuf,
    /// 诊断 HTTP 监听地址；未设置时不启动
    pub http_addr: Option<String>,
    /// 停止时等待在途周期的宽限期
    pub stop_grace_ms: u64,
    /// 遥测通道容量
    pub telemetry_capacity: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取配置。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_file = read_optional(&lookup, "PLC_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let data_dir = match read_optional(&lookup, "PLC_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(&lookup),
        };
        let http_addr = read_optional(&lookup, "PLC_HTTP_ADDR");
        let stop_grace_ms = read_u64_with_default(&lookup, "PLC_STOP_GRACE_MS", 5000)?;
        let telemetry_capacity =
            read_u64_with_default(&lookup, "PLC_TELEMETRY_CAPACITY", 1024)? as usize;
        if telemetry_capacity == 0 {
            return Err(ConfigError::Invalid(
                "PLC_TELEMETRY_CAPACITY".to_string(),
                "0".to_string(),
            ));
        }

        Ok(Self {
            config_file,
            data_dir,
            http_addr,
            stop_grace_ms,
            telemetry_capacity,
        })
    }
}

/// `~/Documents/PLC_Logs`；取不到用户目录时使用当前目录下的 `PLC_Logs`。
fn default_data_dir<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    match read_optional(lookup, "HOME").or_else(|| read_optional(lookup, "USERPROFILE")) {
        Some(home) => PathBuf::from(home).join("Documents").join("PLC_Logs"),
        None => PathBuf::from("PLC_Logs"),
    }
}

fn read_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn read_u64_with_default<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match read_optional(lookup, key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = AppConfig::from_lookup(lookup(&[("HOME", "/home/op")])).unwrap();
        assert_eq!(config.config_file, PathBuf::from("plc_logger_config.json"));
        assert_eq!(config.data_dir, PathBuf::from("/home/op/Documents/PLC_Logs"));
        assert_eq!(config.http_addr, None);
        assert_eq!(config.stop_grace_ms, 5000);
        assert_eq!(config.telemetry_capacity, 1024);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PLC_CONFIG_FILE", "/etc/plc/config.json"),
            ("PLC_DATA_DIR", "/var/lib/plc"),
            ("PLC_HTTP_ADDR", "127.0.0.1:9100"),
            ("PLC_STOP_GRACE_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.config_file, PathBuf::from("/etc/plc/config.json"));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/plc"));
        assert_eq!(config.http_addr.as_deref(), Some("127.0.0.1:9100"));
        assert_eq!(config.stop_grace_ms, 250);
    }

    #[test]
    fn invalid_number_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("PLC_STOP_GRACE_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(key, _) if key == "PLC_STOP_GRACE_MS"));
        let err = AppConfig::from_lookup(lookup(&[("PLC_TELEMETRY_CAPACITY", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_, _)));
    }
}
