//! 存储模型：分区描述、查询条件、落库样本。

use chrono::NaiveDate;
use domain::{ConfigFingerprint, PartitionKey, SampleBatch, SampleValue};
use serde::Serialize;

/// 数据目录中的一个分区。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    pub id: String,
    pub fingerprint: ConfigFingerprint,
    pub date: NaiveDate,
    /// 分区文件大小（内存实现为空）
    pub size_bytes: Option<u64>,
}

impl PartitionInfo {
    pub fn key(&self) -> PartitionKey {
        PartitionKey::new(self.fingerprint.clone(), self.date)
    }
}

/// 样本查询条件；结果按时间升序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleQuery {
    pub tag: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: i64,
}

impl Default for SampleQuery {
    fn default() -> Self {
        Self {
            tag: None,
            from_ms: None,
            to_ms: None,
            limit: 1000,
        }
    }
}

impl SampleQuery {
    pub(crate) fn matches(&self, row: &StoredSample) -> bool {
        if let Some(tag) = &self.tag {
            if &row.tag_name != tag {
                return false;
            }
        }
        if let Some(from) = self.from_ms {
            if row.ts_ms < from {
                return false;
            }
        }
        if let Some(to) = self.to_ms {
            if row.ts_ms > to {
                return false;
            }
        }
        true
    }
}

/// 分区中的一行。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSample {
    pub ts_ms: i64,
    /// RFC 3339，毫秒精度
    pub ts_utc: String,
    pub tag_name: String,
    pub value: Option<SampleValue>,
    pub quality: bool,
}

/// 质量为坏的样本使用的类型标记。
pub(crate) const NO_VALUE_TYPE: &str = "none";

/// 将批次展开为行（每个样本一行，共享批次时间戳）。
pub fn rows_from_batch(batch: &SampleBatch) -> Vec<StoredSample> {
    let ts_ms = batch.ts_ms();
    let ts_utc = batch
        .timestamp
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    batch
        .samples
        .iter()
        .map(|sample| StoredSample {
            ts_ms,
            ts_utc: ts_utc.clone(),
            tag_name: sample.tag.clone(),
            value: sample.value.clone(),
            quality: sample.quality,
        })
        .collect()
}
