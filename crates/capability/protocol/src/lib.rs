//! # 协议适配能力模块
//!
//! 两种寻址方式共用一个适配器接口：
//! - **Modbus TCP**：寄存器区 + 偏移，按区间合并批量读取
//! - **ADS**：符号路径，句柄缓存 + Sum Read 批量读取
//!
//! ## 架构设计
//!
//! ```text
//! EndpointSettings (modbus / ads)
//!       │
//!       ▼
//! Box<dyn ProtocolAdapter>
//!       │
//!       ├── ModbusAdapter ── RegisterConnector ── tokio-modbus
//!       └── AdsAdapter ───── AdsConnector ────── AMS/TCP
//!       │
//!       ▼
//! SampleBatch → 调度器 → Storage
//! ```
//!
//! ## 配置格式
//!
//! ### Modbus TCP
//! ```json
//! { "host": "192.168.0.10", "port": 502, "unit_id": 1 }
//! ```
//!
//! ### ADS
//! ```json
//! { "host": "192.168.0.10", "ams_net_id": "192.168.0.10.1.1", "ams_port": 851 }
//! ```

mod adapter;
pub mod ads;
mod error;
mod factory;
pub mod modbus;

pub use adapter::ProtocolAdapter;
pub use ads::{AdsAdapter, AdsConnector, AdsSettings, ConnectedStream, TcpAdsConnector};
pub use error::{ConnectionError, ReadError};
pub use factory::EndpointSettings;
pub use modbus::{
    ModbusAdapter, ModbusSettings, RangeData, RegisterConnector, RegisterTransport,
    TcpRegisterConnector,
};
