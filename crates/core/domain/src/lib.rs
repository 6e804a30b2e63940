//! 采集领域模型：标签定义、样本批次、连接状态与分区键。
//!
//! 所有能力模块共享这些类型；本 crate 不包含任何 I/O。

pub mod connection;
pub mod data;
pub mod partition;
pub mod tag;

pub use connection::{ConnectionState, ConnectionStatus, ProtocolKind};
pub use data::{Sample, SampleBatch, SampleValue};
pub use partition::{ConfigFingerprint, PartitionKey};
pub use tag::{
    ByteOrder, RegisterAddress, RegisterDataType, RegisterKind, SymbolAddress, SymbolDataType,
    TagAddress, TagDefinition, WordOrder,
};
