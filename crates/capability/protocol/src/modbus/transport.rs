//! 寄存器传输层：抽象单次区间读取，真实实现基于 tokio-modbus。

use super::ModbusSettings;
use crate::error::{ConnectionError, ReadError};
use async_trait::async_trait;
use domain::RegisterKind;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::prelude::*;
use tracing::debug;

/// 一次区间读取的原始结果。
#[derive(Debug, Clone, PartialEq)]
pub enum RangeData {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

/// 已建立的寄存器连接。
#[async_trait]
pub trait RegisterTransport: Send {
    async fn read_range(
        &mut self,
        kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> Result<RangeData, ReadError>;

    async fn close(&mut self);
}

/// 建立寄存器连接。
#[async_trait]
pub trait RegisterConnector: Send + Sync {
    async fn connect(
        &self,
        settings: &ModbusSettings,
        timeout: Duration,
    ) -> Result<Box<dyn RegisterTransport>, ConnectionError>;
}

/// Modbus TCP 连接器
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpRegisterConnector;

#[async_trait]
impl RegisterConnector for TcpRegisterConnector {
    async fn connect(
        &self,
        settings: &ModbusSettings,
        connect_timeout: Duration,
    ) -> Result<Box<dyn RegisterTransport>, ConnectionError> {
        let timeout_ms = connect_timeout.as_millis() as u64;
        let connect = async {
            let addr = tokio::net::lookup_host((settings.host.as_str(), settings.port))
                .await
                .map_err(|e| ConnectionError::Endpoint(format!("{}: {}", settings.host, e)))?
                .next()
                .ok_or_else(|| {
                    ConnectionError::Endpoint(format!("no address for {}", settings.host))
                })?;
            tcp::connect_slave(addr, Slave(settings.unit_id))
                .await
                .map_err(ConnectionError::from_connect_io)
        };

        let ctx = timeout(connect_timeout, connect)
            .await
            .map_err(|_| ConnectionError::Timeout(timeout_ms))??;

        Ok(Box::new(ModbusTcpTransport {
            ctx,
            io_timeout: Duration::from_millis(settings.io_timeout_ms),
        }))
    }
}

struct ModbusTcpTransport {
    ctx: tokio_modbus::client::Context,
    io_timeout: Duration,
}

/// 展开 tokio-modbus 的嵌套结果：外层为传输错误，内层为异常码。
///
/// 单个请求超时后响应可能迟到，事务号不再可信，按传输错误处理。
fn flatten<T>(
    result: Result<tokio_modbus::Result<T>, tokio::time::error::Elapsed>,
    timeout_ms: u64,
) -> Result<T, ReadError> {
    result
        .map_err(|_| {
            ReadError::Transport(format!("request timed out after {}ms", timeout_ms))
        })?
        .map_err(|e| ReadError::Transport(e.to_string()))?
        .map_err(|e| ReadError::Exception(format!("{:?}", e)))
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn read_range(
        &mut self,
        kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> Result<RangeData, ReadError> {
        let timeout_ms = self.io_timeout.as_millis() as u64;
        let data = match kind {
            RegisterKind::Coil => RangeData::Bits(flatten(
                timeout(self.io_timeout, self.ctx.read_coils(start, count)).await,
                timeout_ms,
            )?),
            RegisterKind::DiscreteInput => RangeData::Bits(flatten(
                timeout(self.io_timeout, self.ctx.read_discrete_inputs(start, count)).await,
                timeout_ms,
            )?),
            RegisterKind::Holding => RangeData::Words(flatten(
                timeout(self.io_timeout, self.ctx.read_holding_registers(start, count)).await,
                timeout_ms,
            )?),
            RegisterKind::Input => RangeData::Words(flatten(
                timeout(self.io_timeout, self.ctx.read_input_registers(start, count)).await,
                timeout_ms,
            )?),
        };

        debug!(
            target: "plc.protocol.modbus",
            kind = ?kind,
            start,
            count,
            "read register range"
        );
        Ok(data)
    }

    async fn close(&mut self) {
        let _ = self.ctx.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_timeout_is_fatal() {
        let elapsed = timeout(
            Duration::ZERO,
            std::future::pending::<tokio_modbus::Result<Vec<u16>>>(),
        )
        .await;
        let err = flatten(elapsed, 3000).unwrap_err();
        assert_eq!(
            err,
            ReadError::Transport("request timed out after 3000ms".to_string())
        );
        assert!(err.is_fatal());
    }
}
