//! 采集配置：协议端点、轮询参数、标签列表。

use crate::ConfigError;
use crate::fingerprint::fingerprint;
use domain::{ConfigFingerprint, ProtocolKind, TagDefinition};
use plc_protocol::{AdsSettings, EndpointSettings, ModbusSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// 轮询与健康监控参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingOptions {
    /// 轮询周期
    pub interval_ms: u64,
    /// 单次读取超时（同时作为连接超时）
    pub timeout_ms: u64,
    pub backoff_min_ms: u64,
    pub backoff_cap_ms: u64,
    /// 抖动比例（0.0-1.0）
    pub backoff_jitter: f64,
    /// Connected → Degraded 的连续失败数
    pub failure_threshold: u32,
    /// 强制断开重连的连续失败数
    pub hard_failure_ceiling: u32,
    pub rolling_window_size: usize,
    pub store_timeout_ms: u64,
    /// 批次广播通道容量
    pub subscriber_capacity: usize,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_ms: 3000,
            backoff_min_ms: 500,
            backoff_cap_ms: 30_000,
            backoff_jitter: 0.2,
            failure_threshold: 3,
            hard_failure_ceiling: 10,
            rolling_window_size: 20,
            store_timeout_ms: 5000,
            subscriber_capacity: 16,
        }
    }
}

impl PollingOptions {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String| Err(ConfigError::Invalid(key.to_string(), value));
        if self.interval_ms == 0 {
            return invalid("polling.interval_ms", "0".to_string());
        }
        if self.timeout_ms == 0 {
            return invalid("polling.timeout_ms", "0".to_string());
        }
        if self.store_timeout_ms == 0 {
            return invalid("polling.store_timeout_ms", "0".to_string());
        }
        if self.backoff_min_ms == 0 || self.backoff_cap_ms < self.backoff_min_ms {
            return invalid(
                "polling.backoff_cap_ms",
                format!("{} < {}", self.backoff_cap_ms, self.backoff_min_ms),
            );
        }
        if !(0.0..=1.0).contains(&self.backoff_jitter) {
            return invalid("polling.backoff_jitter", self.backoff_jitter.to_string());
        }
        if self.failure_threshold == 0 || self.hard_failure_ceiling < self.failure_threshold {
            return invalid(
                "polling.hard_failure_ceiling",
                format!(
                    "{} < threshold {}",
                    self.hard_failure_ceiling, self.failure_threshold
                ),
            );
        }
        if self.rolling_window_size == 0 {
            return invalid("polling.rolling_window_size", "0".to_string());
        }
        if self.subscriber_capacity == 0 {
            return invalid("polling.subscriber_capacity", "0".to_string());
        }
        Ok(())
    }
}

/// 采集配置文件内容。
///
/// 文件中缺省的协议段表示不启用该协议；首次运行的默认配置见 `Default`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modbus: Option<ModbusSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ads: Option<AdsSettings>,
    #[serde(default)]
    pub polling: PollingOptions,
    /// 启动后立即开始轮询；否则以暂停状态启动
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub tags: Vec<TagDefinition>,
    /// 触发标签：设置后该协议只在此标签由 false 变为 true 时落库。
    /// 每个协议最多一个。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_tags: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            modbus: Some(ModbusSettings::new("192.168.0.10")),
            ads: None,
            polling: PollingOptions::default(),
            auto_start: false,
            tags: Vec::new(),
            trigger_tags: Vec::new(),
        }
    }
}

impl LoggerConfig {
    /// 从 JSON 解析并校验。
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 加载期校验：标签名唯一（去除首尾空白后比较）、轮询参数合法。
    ///
    /// 地址层面的错误推迟到首次读取时暴露。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::with_capacity(self.tags.len());
        for tag in &self.tags {
            let name = tag.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid(
                    "tags.name".to_string(),
                    "empty".to_string(),
                ));
            }
            if !names.insert(name) {
                return Err(ConfigError::DuplicateTag(name.to_string()));
            }
        }
        self.validate_triggers()?;
        self.polling.validate()
    }

    fn validate_triggers(&self) -> Result<(), ConfigError> {
        let mut protocols = HashSet::new();
        for trigger in &self.trigger_tags {
            let name = trigger.trim();
            let tag = self
                .tags
                .iter()
                .find(|tag| tag.enabled && tag.name.trim() == name)
                .ok_or_else(|| {
                    ConfigError::Invalid("trigger_tags".to_string(), name.to_string())
                })?;
            if !protocols.insert(tag.protocol()) {
                return Err(ConfigError::Invalid(
                    "trigger_tags".to_string(),
                    format!("more than one trigger for {}", tag.protocol()),
                ));
            }
        }
        Ok(())
    }

    /// 某协议的触发标签（已去除首尾空白）。
    pub fn trigger_for(&self, protocol: ProtocolKind) -> Option<String> {
        self.trigger_tags.iter().map(|name| name.trim()).find_map(|name| {
            self.tags
                .iter()
                .find(|tag| tag.enabled && tag.name.trim() == name && tag.protocol() == protocol)
                .map(|_| name.to_string())
        })
    }

    /// 已配置的协议端点。
    pub fn endpoints(&self) -> Vec<EndpointSettings> {
        let mut endpoints = Vec::with_capacity(2);
        if let Some(modbus) = &self.modbus {
            endpoints.push(EndpointSettings::Modbus(modbus.clone()));
        }
        if let Some(ads) = &self.ads {
            endpoints.push(EndpointSettings::Ads(ads.clone()));
        }
        endpoints
    }

    /// 某协议下启用的标签（名称已去除首尾空白）。
    pub fn enabled_tags(&self, protocol: ProtocolKind) -> Vec<TagDefinition> {
        self.tags
            .iter()
            .filter(|tag| tag.enabled && tag.protocol() == protocol)
            .map(|tag| TagDefinition {
                name: tag.name.trim().to_string(),
                ..tag.clone()
            })
            .collect()
    }

    /// 整份配置的指纹（决定是否另存新版本）。
    pub fn fingerprint(&self) -> ConfigFingerprint {
        fingerprint(&self.tags, &self.endpoints())
    }

    /// 单个协议的分区指纹：只覆盖该协议的启用标签与端点，
    /// 另一协议的改动不会切换本协议的分区。
    pub fn protocol_fingerprint(&self, endpoint: &EndpointSettings) -> ConfigFingerprint {
        fingerprint(
            &self.enabled_tags(endpoint.protocol()),
            std::slice::from_ref(endpoint),
        )
    }
}
