//! 样本存储内存实现
//!
//! 仅用于测试和演示。

use crate::error::StoreError;
use crate::models::{PartitionInfo, SampleQuery, StoredSample, rows_from_batch};
use crate::traits::SampleStore;
use async_trait::async_trait;
use domain::{ConfigFingerprint, PartitionKey, SampleBatch};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 样本内存存储
#[derive(Default)]
pub struct InMemorySampleStore {
    partitions: RwLock<BTreeMap<PartitionKey, Vec<StoredSample>>>,
}

impl InMemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分区内的行数（用于测试）
    pub fn rows(&self, key: &PartitionKey) -> usize {
        self.partitions
            .read()
            .map(|partitions| partitions.get(key).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// 全部分区的行数
    pub fn total_rows(&self) -> usize {
        self.partitions
            .read()
            .map(|partitions| partitions.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

fn lock_failed() -> StoreError {
    StoreError::Invalid("lock failed".to_string())
}

#[async_trait]
impl SampleStore for InMemorySampleStore {
    async fn provision(&self, key: &PartitionKey) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| lock_failed())?;
        partitions.entry(key.clone()).or_default();
        Ok(())
    }

    async fn append(
        &self,
        fingerprint: &ConfigFingerprint,
        batch: &SampleBatch,
    ) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let key = PartitionKey::new(fingerprint.clone(), batch.date());
        let rows = rows_from_batch(batch);
        let written = rows.len();
        let mut partitions = self.partitions.write().map_err(|_| lock_failed())?;
        partitions.entry(key).or_default().extend(rows);
        Ok(written)
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionInfo>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| lock_failed())?;
        // BTreeMap 按 (指纹, 日期) 排序；这里按标识重新排序
        let mut list: Vec<PartitionInfo> = partitions
            .keys()
            .map(|key| PartitionInfo {
                id: key.id(),
                fingerprint: key.fingerprint.clone(),
                date: key.date,
                size_bytes: None,
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn query(
        &self,
        key: &PartitionKey,
        query: &SampleQuery,
    ) -> Result<Vec<StoredSample>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| lock_failed())?;
        let rows = partitions
            .get(key)
            .ok_or_else(|| StoreError::UnknownPartition(key.id()))?;
        let limit = query.limit.max(0) as usize;
        let mut selected: Vec<StoredSample> = rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        // 稳定排序保持同一时间戳内的写入顺序
        selected.sort_by_key(|row| row.ts_ms);
        selected.truncate(limit);
        Ok(selected)
    }
}
