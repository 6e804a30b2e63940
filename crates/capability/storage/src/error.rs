//! 存储层错误类型
//!
//! 存储错误只会被记录，不会中断采集周期；批次不重试。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("store timed out after {0}ms")]
    Timeout(u64),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("unknown partition: {0}")]
    UnknownPartition(String),
}
