//! ADS 符号值解析（小端）

use crate::error::ReadError;
use domain::{SampleValue, SymbolAddress, SymbolDataType};

fn take<const N: usize>(raw: &[u8]) -> Result<[u8; N], ReadError> {
    raw.get(..N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| ReadError::Decode(format!("need {} bytes, got {}", N, raw.len())))
}

fn finite(value: f64) -> Result<SampleValue, ReadError> {
    if value.is_finite() {
        Ok(SampleValue::F64(value))
    } else {
        Err(ReadError::Decode(format!("value out of range: {}", value)))
    }
}

/// 把符号的原始字节解析为样本值。
pub fn decode_symbol(raw: &[u8], address: &SymbolAddress) -> Result<SampleValue, ReadError> {
    match address.data_type {
        SymbolDataType::Bool => Ok(SampleValue::Bool(take::<1>(raw)?[0] != 0)),
        SymbolDataType::Byte => Ok(SampleValue::I64(i64::from(take::<1>(raw)?[0]))),
        SymbolDataType::Sint => Ok(SampleValue::I64(i64::from(i8::from_le_bytes(take(raw)?)))),
        SymbolDataType::Word => Ok(SampleValue::I64(i64::from(u16::from_le_bytes(take(raw)?)))),
        SymbolDataType::Int => Ok(SampleValue::I64(i64::from(i16::from_le_bytes(take(raw)?)))),
        SymbolDataType::Dword => Ok(SampleValue::I64(i64::from(u32::from_le_bytes(take(raw)?)))),
        SymbolDataType::Dint => Ok(SampleValue::I64(i64::from(i32::from_le_bytes(take(raw)?)))),
        SymbolDataType::Lint => Ok(SampleValue::I64(i64::from_le_bytes(take(raw)?))),
        SymbolDataType::Ulint => {
            let value = u64::from_le_bytes(take(raw)?);
            i64::try_from(value)
                .map(SampleValue::I64)
                .map_err(|_| ReadError::Decode(format!("ULINT {} exceeds i64", value)))
        }
        SymbolDataType::Real => finite(f64::from(f32::from_le_bytes(take(raw)?))),
        SymbolDataType::Lreal => finite(f64::from_le_bytes(take(raw)?)),
        SymbolDataType::String => {
            let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
            Ok(SampleValue::String(
                String::from_utf8_lossy(&raw[..end]).into_owned(),
            ))
        }
    }
}
