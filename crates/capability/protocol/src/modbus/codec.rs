//! 寄存器数据解析

use crate::error::ReadError;
use domain::{ByteOrder, RegisterAddress, RegisterDataType, SampleValue, WordOrder};

/// 按字节序调整单个寄存器，结果为大端语义的 16 位值。
fn normalize_word(word: u16, byte_order: ByteOrder) -> u16 {
    match byte_order {
        ByteOrder::BigEndian => word,
        ByteOrder::LittleEndian => word.swap_bytes(),
    }
}

/// 按字序和字节序拼接多个寄存器为大端字节串。
fn assemble(words: &[u16], address: &RegisterAddress) -> Vec<u8> {
    let mut ordered: Vec<u16> = words
        .iter()
        .map(|word| normalize_word(*word, address.byte_order))
        .collect();
    if address.word_order == WordOrder::LowFirst {
        ordered.reverse();
    }
    ordered.iter().flat_map(|word| word.to_be_bytes()).collect()
}

fn finite(value: f64) -> Result<SampleValue, ReadError> {
    if value.is_finite() {
        Ok(SampleValue::F64(value))
    } else {
        Err(ReadError::Decode(format!("value out of range: {}", value)))
    }
}

/// 解析字区（保持 / 输入寄存器）数据。
///
/// `words` 从标签起始偏移开始，长度至少为 `address.length()`。
pub fn decode_words(words: &[u16], address: &RegisterAddress) -> Result<SampleValue, ReadError> {
    let needed = address.data_type.word_count() as usize;
    if words.len() < needed {
        return Err(ReadError::Decode(format!(
            "need {} registers for {:?}, got {}",
            needed,
            address.data_type,
            words.len()
        )));
    }
    let bytes = assemble(&words[..needed], address);

    match address.data_type {
        RegisterDataType::Bool => {
            let word = u16::from_be_bytes([bytes[0], bytes[1]]);
            let bit = address.bit.unwrap_or(0);
            Ok(SampleValue::Bool((word >> bit) & 1 == 1))
        }
        RegisterDataType::Int16 => Ok(SampleValue::I64(i64::from(i16::from_be_bytes([
            bytes[0], bytes[1],
        ])))),
        RegisterDataType::Uint16 => Ok(SampleValue::I64(i64::from(u16::from_be_bytes([
            bytes[0], bytes[1],
        ])))),
        RegisterDataType::Int32 => Ok(SampleValue::I64(i64::from(i32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])))),
        RegisterDataType::Uint32 => Ok(SampleValue::I64(i64::from(u32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])))),
        RegisterDataType::Float32 => finite(f64::from(f32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        RegisterDataType::Float64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            finite(f64::from_be_bytes(raw))
        }
    }
}

/// 解析位区（线圈 / 离散输入）数据。
pub fn decode_bit(bits: &[bool]) -> Result<SampleValue, ReadError> {
    bits.first()
        .copied()
        .map(SampleValue::Bool)
        .ok_or_else(|| ReadError::Decode("empty bit response".to_string()))
}
