//! # PLC Storage 模块
//!
//! 样本存储：按 (配置指纹, UTC 日期) 分区，只追加。
//!
//! ## 模块说明
//!
//! - [`traits`]：`SampleStore` 接口（provision / append / list_partitions / query）
//! - [`models`]：分区描述、查询条件、落库样本
//! - [`error`]：`StoreError`
//! - [`connection`]：分区数据库连接（单写者 + 只读连接）
//! - [`sqlite`]：SQLite 实现，每个分区一个数据库文件，WAL 模式
//! - [`in_memory`]：内存实现（测试使用）
//!
//! ## 分区表结构
//!
//! - `samples(id, ts_ms, ts_utc, tag_name, value_type, value_int, value_real, value_text, quality)`
//! - 索引 `(tag_name, ts_ms)`、`(ts_ms)`
//! - `partition_meta(key, value)`：记录分区指纹、日期、创建时间
//!
//! 一个批次一个事务；写入失败时整批回滚，不产生部分行。

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod sqlite;
pub mod traits;

pub use error::StoreError;
pub use in_memory::InMemorySampleStore;
pub use models::{PartitionInfo, SampleQuery, StoredSample, rows_from_batch};
pub use sqlite::SqliteSampleStore;
pub use traits::SampleStore;
