//! Modbus TCP 寄存器寻址适配器
//!
//! 连接 Modbus 从设备，按寄存器区合并标签后批量读取。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let settings = ModbusSettings::from_json(r#"{"host": "192.168.0.10"}"#)?;
//! let mut adapter = ModbusAdapter::new(settings);
//! adapter.connect(Duration::from_secs(3)).await?;
//! let batch = adapter.read_batch(&tags).await?;
//! ```

mod codec;
mod plan;
mod transport;

pub use codec::{decode_bit, decode_words};
pub use plan::{plan_reads, validate_address, ReadPlan, ReadRange};
pub use transport::{RangeData, RegisterConnector, RegisterTransport, TcpRegisterConnector};

use crate::adapter::ProtocolAdapter;
use crate::error::{ConnectionError, ReadError};
use async_trait::async_trait;
use chrono::Utc;
use domain::{ProtocolKind, Sample, SampleBatch, TagAddress, TagDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Modbus TCP 连接设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusSettings {
    /// Modbus 服务器主机地址
    pub host: String,
    /// Modbus 服务器端口（默认 502）
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// 从站 ID（默认 1）
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// 合并请求时允许跨越的空洞寄存器数
    #[serde(default)]
    pub max_register_gap: u16,
    /// 单次请求超时（毫秒）
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

pub(crate) fn default_io_timeout() -> u64 {
    3000
}

impl ModbusSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_modbus_port(),
            unit_id: default_unit_id(),
            max_register_gap: 0,
            io_timeout_ms: default_io_timeout(),
        }
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ConnectionError> {
        serde_json::from_str(json).map_err(|e| ConnectionError::Endpoint(e.to_string()))
    }
}

/// Modbus 寄存器适配器
pub struct ModbusAdapter {
    settings: ModbusSettings,
    connector: Arc<dyn RegisterConnector>,
    transport: Option<Box<dyn RegisterTransport>>,
}

impl ModbusAdapter {
    pub fn new(settings: ModbusSettings) -> Self {
        Self::with_connector(settings, Arc::new(TcpRegisterConnector))
    }

    /// 注入自定义连接器（测试用假设备）。
    pub fn with_connector(settings: ModbusSettings, connector: Arc<dyn RegisterConnector>) -> Self {
        Self {
            settings,
            connector,
            transport: None,
        }
    }

    pub fn settings(&self) -> &ModbusSettings {
        &self.settings
    }

    async fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }
}

#[async_trait]
impl ProtocolAdapter for ModbusAdapter {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Modbus
    }

    fn endpoint(&self) -> String {
        format!(
            "{}:{}/unit{}",
            self.settings.host, self.settings.port, self.settings.unit_id
        )
    }

    fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    async fn connect(&mut self, timeout: Duration) -> Result<(), ConnectionError> {
        if self.transport.is_some() {
            return Ok(());
        }
        let transport = self.connector.connect(&self.settings, timeout).await?;
        self.transport = Some(transport);
        info!(
            target: "plc.protocol.modbus",
            endpoint = %self.endpoint(),
            "modbus_connected"
        );
        Ok(())
    }

    async fn read_batch(&mut self, tags: &[TagDefinition]) -> Result<SampleBatch, ReadError> {
        let timestamp = Utc::now();
        let plan = plan_reads(tags, self.settings.max_register_gap);
        let mut slots: Vec<Option<Sample>> = vec![None; tags.len()];

        for (idx, err) in plan.rejected {
            warn!(
                target: "plc.protocol.modbus",
                tag = %tags[idx].name,
                error = %err,
                "tag_rejected"
            );
            slots[idx] = Some(Sample::bad(tags[idx].name.clone(), err.to_string()));
        }

        for range in &plan.ranges {
            let transport = self.transport.as_mut().ok_or(ReadError::NotConnected)?;
            let data = match transport.read_range(range.kind, range.start, range.count).await {
                Ok(data) => data,
                Err(err @ ReadError::Exception(_)) => {
                    // 异常响应只影响该区间内的标签
                    debug!(
                        target: "plc.protocol.modbus",
                        start = range.start,
                        count = range.count,
                        error = %err,
                        "range_exception"
                    );
                    for idx in &range.members {
                        slots[*idx] = Some(Sample::bad(tags[*idx].name.clone(), err.to_string()));
                    }
                    continue;
                }
                Err(err) => {
                    if err.is_fatal() {
                        self.drop_transport().await;
                    }
                    return Err(err);
                }
            };

            for idx in &range.members {
                let tag = &tags[*idx];
                let TagAddress::Register(address) = &tag.address else {
                    continue;
                };
                let rel = usize::from(address.offset - range.start);
                let decoded = match &data {
                    RangeData::Bits(bits) => decode_bit(bits.get(rel..).unwrap_or(&[])),
                    RangeData::Words(words) => {
                        decode_words(words.get(rel..).unwrap_or(&[]), address)
                    }
                };
                slots[*idx] = Some(match decoded {
                    Ok(value) => Sample::good(tag.name.clone(), tag.apply_scaling(value)),
                    Err(err) => Sample::bad(tag.name.clone(), err.to_string()),
                });
            }
        }

        let samples = slots
            .into_iter()
            .zip(tags)
            .map(|(slot, tag)| {
                slot.unwrap_or_else(|| Sample::bad(tag.name.clone(), "tag not read"))
            })
            .collect();
        Ok(SampleBatch::new(timestamp, samples))
    }

    async fn disconnect(&mut self) {
        if self.transport.is_some() {
            self.drop_transport().await;
            info!(
                target: "plc.protocol.modbus",
                endpoint = %self.endpoint(),
                "modbus_disconnected"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ByteOrder, RegisterAddress, RegisterDataType, RegisterKind, SampleValue, WordOrder};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 内存寄存器表模拟从站
    #[derive(Default)]
    struct FakeDevice {
        holding: HashMap<u16, u16>,
        coils: HashMap<u16, bool>,
        exception_at: Option<u16>,
        fail_transport: bool,
        requests: Mutex<Vec<(RegisterKind, u16, u16)>>,
    }

    struct FakeTransport(Arc<FakeDevice>);

    #[async_trait]
    impl RegisterTransport for FakeTransport {
        async fn read_range(
            &mut self,
            kind: RegisterKind,
            start: u16,
            count: u16,
        ) -> Result<RangeData, ReadError> {
            let device = &self.0;
            device.requests.lock().unwrap().push((kind, start, count));
            if device.fail_transport {
                return Err(ReadError::Transport("connection reset".to_string()));
            }
            if device.exception_at == Some(start) {
                return Err(ReadError::Exception("IllegalDataAddress".to_string()));
            }
            let range = start..start + count;
            Ok(match kind {
                RegisterKind::Coil | RegisterKind::DiscreteInput => RangeData::Bits(
                    range
                        .map(|a| device.coils.get(&a).copied().unwrap_or(false))
                        .collect(),
                ),
                _ => RangeData::Words(
                    range
                        .map(|a| device.holding.get(&a).copied().unwrap_or(0))
                        .collect(),
                ),
            })
        }

        async fn close(&mut self) {}
    }

    struct FakeConnector(Arc<FakeDevice>);

    #[async_trait]
    impl RegisterConnector for FakeConnector {
        async fn connect(
            &self,
            _settings: &ModbusSettings,
            _timeout: Duration,
        ) -> Result<Box<dyn RegisterTransport>, ConnectionError> {
            Ok(Box::new(FakeTransport(self.0.clone())))
        }
    }

    fn holding(name: &str, offset: u16, data_type: RegisterDataType) -> TagDefinition {
        TagDefinition::new(
            name,
            TagAddress::Register(RegisterAddress {
                kind: RegisterKind::Holding,
                offset,
                data_type,
                bit: None,
                byte_order: ByteOrder::BigEndian,
                word_order: WordOrder::HighFirst,
            }),
        )
    }

    async fn connected(device: FakeDevice) -> (ModbusAdapter, Arc<FakeDevice>) {
        let device = Arc::new(device);
        let mut adapter = ModbusAdapter::with_connector(
            ModbusSettings::new("127.0.0.1"),
            Arc::new(FakeConnector(device.clone())),
        );
        adapter.connect(Duration::from_secs(1)).await.unwrap();
        (adapter, device)
    }

    #[test]
    fn test_parse_settings() {
        let settings = ModbusSettings::from_json(r#"{"host": "192.168.0.10"}"#).unwrap();
        assert_eq!(settings.port, 502);
        assert_eq!(settings.unit_id, 1);
        assert_eq!(settings.io_timeout_ms, 3000);
        assert!(ModbusSettings::from_json(r#"{"port": 502}"#).is_err());
    }

    #[tokio::test]
    async fn read_without_connect_fails() {
        let mut adapter = ModbusAdapter::with_connector(
            ModbusSettings::new("127.0.0.1"),
            Arc::new(FakeConnector(Arc::new(FakeDevice::default()))),
        );
        let tags = vec![holding("a", 0, RegisterDataType::Int16)];
        assert_eq!(
            adapter.read_batch(&tags).await.unwrap_err(),
            ReadError::NotConnected
        );
    }

    #[tokio::test]
    async fn nan_float_degrades_only_that_tag() {
        let mut device = FakeDevice::default();
        // speed = 1.5f32, counter = 42, level = NaN
        device.holding.insert(0, 0x3FC0);
        device.holding.insert(1, 0x0000);
        device.holding.insert(2, 42);
        device.holding.insert(3, 0x7FC0);
        device.holding.insert(4, 0x0000);
        let (mut adapter, device) = connected(device).await;

        let tags = vec![
            holding("speed", 0, RegisterDataType::Float32),
            holding("counter", 2, RegisterDataType::Uint16),
            holding("level", 3, RegisterDataType::Float32),
        ];
        let batch = adapter.read_batch(&tags).await.unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.samples[0].value, Some(SampleValue::F64(1.5)));
        assert_eq!(batch.samples[1].value, Some(SampleValue::I64(42)));
        assert!(!batch.samples[2].quality);
        assert!(batch.samples[2].value.is_none());
        assert_eq!(batch.good_count(), 2);
        // 三个标签合并成一次请求
        assert_eq!(device.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exception_degrades_only_its_range() {
        let mut device = FakeDevice::default();
        device.holding.insert(0, 7);
        device.exception_at = Some(100);
        let (mut adapter, _) = connected(device).await;

        let tags = vec![
            holding("ok", 0, RegisterDataType::Int16),
            holding("missing", 100, RegisterDataType::Int16),
        ];
        let batch = adapter.read_batch(&tags).await.unwrap();
        assert!(batch.samples[0].quality);
        assert!(!batch.samples[1].quality);
        assert!(batch.samples[1]
            .error
            .as_deref()
            .unwrap()
            .contains("IllegalDataAddress"));
        assert!(adapter.is_connected());
    }

    #[tokio::test]
    async fn transport_failure_fails_batch_and_drops_connection() {
        let device = FakeDevice {
            fail_transport: true,
            ..FakeDevice::default()
        };
        let (mut adapter, _) = connected(device).await;
        let tags = vec![holding("a", 0, RegisterDataType::Int16)];
        let err = adapter.read_batch(&tags).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn coils_and_scaling() {
        let mut device = FakeDevice::default();
        device.coils.insert(5, true);
        device.holding.insert(10, 250);
        let (mut adapter, _) = connected(device).await;

        let coil = TagDefinition::new(
            "running",
            TagAddress::Register(RegisterAddress {
                kind: RegisterKind::Coil,
                offset: 5,
                data_type: RegisterDataType::Bool,
                bit: None,
                byte_order: ByteOrder::BigEndian,
                word_order: WordOrder::HighFirst,
            }),
        );
        let mut temp = holding("temp", 10, RegisterDataType::Int16);
        temp.scale = Some(0.1);

        let batch = adapter.read_batch(&[coil, temp]).await.unwrap();
        assert_eq!(batch.samples[0].value, Some(SampleValue::Bool(true)));
        match batch.samples[1].value {
            Some(SampleValue::F64(v)) => assert!((v - 25.0).abs() < 1e-9),
            ref other => panic!("unexpected value {:?}", other),
        }
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (mut adapter, _) = connected(FakeDevice::default()).await;
        adapter.disconnect().await;
        adapter.disconnect().await;
        assert!(!adapter.is_connected());
    }
}
