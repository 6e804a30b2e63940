//! 样本存储接口

use crate::error::StoreError;
use crate::models::{PartitionInfo, SampleQuery, StoredSample};
use async_trait::async_trait;
use domain::{ConfigFingerprint, PartitionKey, SampleBatch};

/// 样本存储。
///
/// 分区只追加、不合并；每行都在其分区指纹下写入。
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// 确保分区存在（幂等）。
    async fn provision(&self, key: &PartitionKey) -> Result<(), StoreError>;

    /// 将批次写入 `(fingerprint, 批次日期)` 分区，一个批次一个事务。
    ///
    /// 日期翻转时按需建新分区。返回写入行数。
    async fn append(
        &self,
        fingerprint: &ConfigFingerprint,
        batch: &SampleBatch,
    ) -> Result<usize, StoreError>;

    /// 列出全部分区（按标识排序）。
    async fn list_partitions(&self) -> Result<Vec<PartitionInfo>, StoreError>;

    /// 按标签和时间范围查询分区内的样本。
    async fn query(
        &self,
        key: &PartitionKey,
        query: &SampleQuery,
    ) -> Result<Vec<StoredSample>, StoreError>;
}
