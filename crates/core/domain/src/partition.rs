use chrono::NaiveDate;
use serde::Serialize;

const PARTITION_PREFIX: &str = "plc_data_";
const FINGERPRINT_MARKER: &str = "_config-";

/// 配置指纹：启用标签集合 + 协议设置的摘要。
///
/// 只作为分区键使用，不是安全原语。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    /// 由十六进制摘要构造；仅接受 `[0-9a-f]`。
    pub fn from_hex(hex: impl Into<String>) -> Option<Self> {
        let hex = hex.into();
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
            return None;
        }
        Some(Self(hex))
    }

    /// 由摘要字节构造（小写十六进制）。
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(digest.iter().map(|byte| format!("{:02x}", byte)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 分区键：(配置指纹, UTC 日期)。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PartitionKey {
    pub fingerprint: ConfigFingerprint,
    pub date: NaiveDate,
}

impl PartitionKey {
    pub fn new(fingerprint: ConfigFingerprint, date: NaiveDate) -> Self {
        Self { fingerprint, date }
    }

    /// 分区标识：`plc_data_{YYYY-MM-DD}_config-{fingerprint}`。
    pub fn id(&self) -> String {
        format!(
            "{}{}{}{}",
            PARTITION_PREFIX,
            self.date.format("%Y-%m-%d"),
            FINGERPRINT_MARKER,
            self.fingerprint
        )
    }

    /// 解析分区标识；外部读取方据此列举分区。
    pub fn parse_id(id: &str) -> Option<Self> {
        let rest = id.strip_prefix(PARTITION_PREFIX)?;
        let (date, fingerprint) = rest.split_once(FINGERPRINT_MARKER)?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        let fingerprint = ConfigFingerprint::from_hex(fingerprint)?;
        Some(Self { fingerprint, date })
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_id_parses_back() {
        let key = PartitionKey::new(
            ConfigFingerprint::from_hex("0a1b2c3d4e5f6071").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        );
        assert_eq!(key.id(), "plc_data_2024-02-29_config-0a1b2c3d4e5f6071");
        assert_eq!(PartitionKey::parse_id(&key.id()), Some(key));
    }

    #[test]
    fn digest_renders_lower_hex() {
        let fp = ConfigFingerprint::from_digest(&[0x0a, 0xff, 0x10]);
        assert_eq!(fp.as_str(), "0aff10");
        assert_eq!(ConfigFingerprint::from_hex("0aff10"), Some(fp));
    }

    #[test]
    fn partition_id_rejects_foreign_names() {
        assert!(PartitionKey::parse_id("plc_data_2024-02-29").is_none());
        assert!(PartitionKey::parse_id("plc_data_2024-13-01_config-abcd").is_none());
        assert!(PartitionKey::parse_id("plc_data_2024-01-01_config-XYZ").is_none());
        assert!(PartitionKey::parse_id("other_2024-01-01_config-abcd").is_none());
    }
}
