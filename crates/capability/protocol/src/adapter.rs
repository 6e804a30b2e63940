//! 协议适配器抽象

use crate::error::{ConnectionError, ReadError};
use async_trait::async_trait;
use domain::{ProtocolKind, SampleBatch, TagDefinition};
use std::time::Duration;

/// 两种协议共用的能力集：connect / read_batch / disconnect。
///
/// 每个实例独占一条物理连接，由单个调度器串行驱动。
#[async_trait]
pub trait ProtocolAdapter: Send {
    fn protocol(&self) -> ProtocolKind;

    /// 用于日志的端点描述。
    fn endpoint(&self) -> String;

    fn is_connected(&self) -> bool;

    /// 建立连接；已连接时直接返回 Ok。
    async fn connect(&mut self, timeout: Duration) -> Result<(), ConnectionError>;

    /// 一次往返读取一批标签，样本顺序与 `tags` 一致。
    async fn read_batch(&mut self, tags: &[TagDefinition]) -> Result<SampleBatch, ReadError>;

    /// 释放资源；可重复调用。
    async fn disconnect(&mut self);
}
