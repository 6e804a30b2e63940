//! 标签定义与两种协议的地址模型。

use crate::connection::ProtocolKind;
use crate::data::SampleValue;
use serde::{Deserialize, Serialize};

/// Modbus 寄存器区。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// 线圈 (0x01)
    Coil,
    /// 离散输入 (0x02)
    DiscreteInput,
    /// 保持寄存器 (0x03)
    Holding,
    /// 输入寄存器 (0x04)
    Input,
}

impl RegisterKind {
    /// 位寻址区（线圈 / 离散输入）。
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    /// 单次请求允许的最大数量（位区 2000，字区 125）。
    pub fn max_request_len(&self) -> u16 {
        if self.is_bit() { 2000 } else { 125 }
    }
}

/// Modbus 寄存器数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterDataType {
    /// 线圈 / 离散输入，或字内位（需配合 `bit`）
    Bool,
    /// 16位有符号整数
    Int16,
    /// 16位无符号整数
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
    /// 64位浮点数（4个寄存器）
    Float64,
}

impl Default for RegisterDataType {
    fn default() -> Self {
        Self::Int16
    }
}

impl RegisterDataType {
    /// 占用的 16 位寄存器数量。
    pub fn word_count(&self) -> u16 {
        match self {
            Self::Bool | Self::Int16 | Self::Uint16 => 1,
            Self::Int32 | Self::Uint32 | Self::Float32 => 2,
            Self::Float64 => 4,
        }
    }
}

/// 字内字节序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// 多寄存器值的字序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// 高字在前（Modbus 常规）
    #[default]
    HighFirst,
    /// 低字在前
    LowFirst,
}

/// 寄存器寻址：寄存器区 + 偏移 + 数据类型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAddress {
    pub kind: RegisterKind,
    pub offset: u16,
    #[serde(default)]
    pub data_type: RegisterDataType,
    /// 字内位号（0-15），仅对保持/输入寄存器上的 bool 有效
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit: Option<u8>,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub word_order: WordOrder,
}

impl RegisterAddress {
    /// 地址覆盖的长度（位区为位数，字区为寄存器数）。
    pub fn length(&self) -> u16 {
        if self.kind.is_bit() {
            1
        } else {
            self.data_type.word_count()
        }
    }

    /// 覆盖区间的结束位置（不含）。
    pub fn end(&self) -> u32 {
        u32::from(self.offset) + u32::from(self.length())
    }
}

/// ADS 符号数据类型（IEC 61131-3 命名）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolDataType {
    Bool,
    #[serde(alias = "usint")]
    Byte,
    Sint,
    #[serde(alias = "uint")]
    Word,
    Int,
    #[serde(alias = "udint")]
    Dword,
    Dint,
    Lint,
    Ulint,
    Real,
    Lreal,
    String,
}

/// PLC STRING 默认长度：80 字符 + 结束符。
pub const DEFAULT_STRING_LENGTH: u32 = 81;

impl SymbolDataType {
    /// 读取所需字节数；STRING 使用声明长度（含结束符）。
    pub fn byte_size(&self, length: Option<u32>) -> u32 {
        match self {
            Self::Bool | Self::Byte | Self::Sint => 1,
            Self::Word | Self::Int => 2,
            Self::Dword | Self::Dint | Self::Real => 4,
            Self::Lint | Self::Ulint | Self::Lreal => 8,
            Self::String => length.unwrap_or(DEFAULT_STRING_LENGTH),
        }
    }
}

/// 符号寻址：符号路径 + 数据类型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolAddress {
    /// 例如 `MAIN.Counter`、`GVL.Line1.Speed`
    pub path: String,
    pub data_type: SymbolDataType,
    /// STRING 的字节长度（含结束符）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl SymbolAddress {
    pub fn byte_size(&self) -> u32 {
        self.data_type.byte_size(self.length)
    }
}

/// 标签地址（按协议区分）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum TagAddress {
    Register(RegisterAddress),
    Symbol(SymbolAddress),
}

impl TagAddress {
    /// 地址所属协议。
    pub fn protocol(&self) -> ProtocolKind {
        match self {
            Self::Register(_) => ProtocolKind::Modbus,
            Self::Symbol(_) => ProtocolKind::Ads,
        }
    }
}

/// 标签定义。
///
/// 轮询会话期间不可变，仅由配置重新加载替换。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDefinition {
    /// 标签名（同一配置内唯一）
    pub name: String,
    pub address: TagAddress,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 缩放系数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// 偏移量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
}

fn default_enabled() -> bool {
    true
}

impl TagDefinition {
    /// 构造启用状态、无缩放的标签。
    pub fn new(name: impl Into<String>, address: TagAddress) -> Self {
        Self {
            name: name.into(),
            address,
            enabled: true,
            scale: None,
            offset: None,
        }
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.address.protocol()
    }

    /// 应用缩放和偏移；未配置时原样返回，配置后数值统一为 F64。
    pub fn apply_scaling(&self, value: SampleValue) -> SampleValue {
        if self.scale.is_none() && self.offset.is_none() {
            return value;
        }
        let Some(raw) = value.as_f64() else {
            return value;
        };
        if matches!(value, SampleValue::Bool(_)) {
            return value;
        }
        let scaled = match (self.scale, self.offset) {
            (Some(scale), Some(offset)) => raw * scale + offset,
            (Some(scale), None) => raw * scale,
            (None, Some(offset)) => raw + offset,
            (None, None) => raw,
        };
        SampleValue::F64(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_tag_parses_with_defaults() {
        let json = r#"{
            "name": "Line Speed",
            "address": {"protocol": "register", "kind": "holding", "offset": 10, "data_type": "float32"}
        }"#;
        let tag: TagDefinition = serde_json::from_str(json).unwrap();
        assert!(tag.enabled);
        assert_eq!(tag.protocol(), ProtocolKind::Modbus);
        let TagAddress::Register(address) = &tag.address else {
            panic!("expected register address");
        };
        assert_eq!(address.length(), 2);
        assert_eq!(address.end(), 12);
        assert_eq!(address.byte_order, ByteOrder::BigEndian);
        assert_eq!(address.word_order, WordOrder::HighFirst);
    }

    #[test]
    fn symbol_tag_accepts_type_aliases() {
        let json = r#"{
            "name": "counter",
            "enabled": false,
            "address": {"protocol": "symbol", "path": "MAIN.Counter", "data_type": "udint"}
        }"#;
        let tag: TagDefinition = serde_json::from_str(json).unwrap();
        assert!(!tag.enabled);
        let TagAddress::Symbol(address) = &tag.address else {
            panic!("expected symbol address");
        };
        assert_eq!(address.data_type, SymbolDataType::Dword);
        assert_eq!(address.byte_size(), 4);
    }

    #[test]
    fn coil_length_is_one_bit() {
        let address = RegisterAddress {
            kind: RegisterKind::Coil,
            offset: 7,
            data_type: RegisterDataType::Float32,
            bit: None,
            byte_order: ByteOrder::default(),
            word_order: WordOrder::default(),
        };
        assert_eq!(address.length(), 1);
    }

    #[test]
    fn scaling_converts_to_f64() {
        let mut tag = TagDefinition::new(
            "t",
            TagAddress::Symbol(SymbolAddress {
                path: "MAIN.T".to_string(),
                data_type: SymbolDataType::Int,
                length: None,
            }),
        );
        assert_eq!(tag.apply_scaling(SampleValue::I64(5)), SampleValue::I64(5));
        tag.scale = Some(0.5);
        tag.offset = Some(1.0);
        assert_eq!(tag.apply_scaling(SampleValue::I64(10)), SampleValue::F64(6.0));
        assert_eq!(
            tag.apply_scaling(SampleValue::Bool(true)),
            SampleValue::Bool(true)
        );
    }
}
