//! 按协议设置构造适配器

use crate::adapter::ProtocolAdapter;
use crate::ads::{AdsAdapter, AdsSettings};
use crate::modbus::{ModbusAdapter, ModbusSettings};
use domain::ProtocolKind;

/// 单个协议端点的连接设置。
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointSettings {
    Modbus(ModbusSettings),
    Ads(AdsSettings),
}

impl EndpointSettings {
    pub fn protocol(&self) -> ProtocolKind {
        match self {
            Self::Modbus(_) => ProtocolKind::Modbus,
            Self::Ads(_) => ProtocolKind::Ads,
        }
    }

    /// 构造该端点的适配器（尚未连接）。
    pub fn build_adapter(&self) -> Box<dyn ProtocolAdapter> {
        match self {
            Self::Modbus(settings) => Box::new(ModbusAdapter::new(settings.clone())),
            Self::Ads(settings) => Box::new(AdsAdapter::new(settings.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_matching_adapter() {
        let modbus = EndpointSettings::Modbus(ModbusSettings::new("192.168.0.10"));
        let adapter = modbus.build_adapter();
        assert_eq!(adapter.protocol(), ProtocolKind::Modbus);
        assert!(!adapter.is_connected());
        assert_eq!(adapter.endpoint(), "192.168.0.10:502/unit1");

        let ads = EndpointSettings::Ads(AdsSettings::new("192.168.0.10"));
        assert_eq!(ads.protocol(), ProtocolKind::Ads);
        assert_eq!(ads.build_adapter().protocol(), ProtocolKind::Ads);
    }
}
