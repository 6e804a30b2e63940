//! 读取计划：把寄存器标签合并为尽量少的连续区间请求。

use crate::error::ReadError;
use domain::{RegisterAddress, RegisterDataType, RegisterKind, TagAddress, TagDefinition};

/// 一次物理读取请求覆盖的区间。
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRange {
    pub kind: RegisterKind,
    pub start: u16,
    pub count: u16,
    /// 落在该区间内的标签下标（指向输入切片）
    pub members: Vec<usize>,
}

impl ReadRange {
    fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.count)
    }
}

/// 合并后的读取计划；`rejected` 为配置非法的标签，不发起请求。
#[derive(Debug, Default)]
pub struct ReadPlan {
    pub ranges: Vec<ReadRange>,
    pub rejected: Vec<(usize, ReadError)>,
}

/// 校验寄存器地址，错误在首次使用时暴露为该标签的坏质量。
pub fn validate_address(address: &RegisterAddress) -> Result<(), ReadError> {
    if let Some(bit) = address.bit {
        if address.kind.is_bit() {
            return Err(ReadError::Config(format!(
                "bit index is not allowed on {:?} area",
                address.kind
            )));
        }
        if bit > 15 {
            return Err(ReadError::Config(format!("bit index {} out of range 0-15", bit)));
        }
        if address.data_type != RegisterDataType::Bool {
            return Err(ReadError::Config(
                "bit index requires bool data type".to_string(),
            ));
        }
    }
    if address.end() > u32::from(u16::MAX) + 1 {
        return Err(ReadError::Config(format!(
            "address {} + {} exceeds register space",
            address.offset,
            address.length()
        )));
    }
    Ok(())
}

/// 按寄存器区分组、按偏移排序，合并相邻或重叠的区间。
///
/// `max_gap` 允许跨越的空洞寄存器数；合并后的长度不超过该区单次请求上限。
pub fn plan_reads(tags: &[TagDefinition], max_gap: u16) -> ReadPlan {
    let mut plan = ReadPlan::default();
    let mut entries: Vec<(usize, &RegisterAddress)> = Vec::with_capacity(tags.len());

    for (idx, tag) in tags.iter().enumerate() {
        match &tag.address {
            TagAddress::Register(address) => match validate_address(address) {
                Ok(()) => entries.push((idx, address)),
                Err(err) => plan.rejected.push((idx, err)),
            },
            TagAddress::Symbol(_) => plan.rejected.push((
                idx,
                ReadError::Config("symbol address on register protocol".to_string()),
            )),
        }
    }

    entries.sort_by_key(|(_, address)| (address.kind, address.offset, address.end()));

    for (idx, address) in entries {
        let max_len = u32::from(address.kind.max_request_len());
        if let Some(current) = plan.ranges.last_mut() {
            let reachable = u32::from(address.offset) <= current.end() + u32::from(max_gap);
            let merged_end = current.end().max(address.end());
            if current.kind == address.kind
                && reachable
                && merged_end - u32::from(current.start) <= max_len
            {
                current.count = (merged_end - u32::from(current.start)) as u16;
                current.members.push(idx);
                continue;
            }
        }
        plan.ranges.push(ReadRange {
            kind: address.kind,
            start: address.offset,
            count: address.length(),
            members: vec![idx],
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ByteOrder, SymbolAddress, SymbolDataType, WordOrder};

    fn register(name: &str, kind: RegisterKind, offset: u16, data_type: RegisterDataType) -> TagDefinition {
        TagDefinition::new(
            name,
            TagAddress::Register(RegisterAddress {
                kind,
                offset,
                data_type,
                bit: None,
                byte_order: ByteOrder::default(),
                word_order: WordOrder::default(),
            }),
        )
    }

    #[test]
    fn adjacent_tags_share_one_request() {
        let tags = vec![
            register("speed", RegisterKind::Holding, 10, RegisterDataType::Float32),
            register("count", RegisterKind::Holding, 12, RegisterDataType::Uint16),
            register("temp", RegisterKind::Holding, 13, RegisterDataType::Int16),
        ];
        let plan = plan_reads(&tags, 0);
        assert!(plan.rejected.is_empty());
        assert_eq!(plan.ranges.len(), 1);
        assert_eq!(plan.ranges[0].start, 10);
        assert_eq!(plan.ranges[0].count, 4);
        assert_eq!(plan.ranges[0].members, vec![0, 1, 2]);
    }

    #[test]
    fn gaps_and_areas_split_requests() {
        let tags = vec![
            register("a", RegisterKind::Holding, 0, RegisterDataType::Int16),
            register("b", RegisterKind::Holding, 5, RegisterDataType::Int16),
            register("c", RegisterKind::Input, 1, RegisterDataType::Int16),
            register("d", RegisterKind::Coil, 3, RegisterDataType::Bool),
        ];
        let plan = plan_reads(&tags, 0);
        assert_eq!(plan.ranges.len(), 4);

        let plan = plan_reads(&tags, 4);
        let holding: Vec<_> = plan
            .ranges
            .iter()
            .filter(|range| range.kind == RegisterKind::Holding)
            .collect();
        assert_eq!(holding.len(), 1);
        assert_eq!(holding[0].count, 6);
    }

    #[test]
    fn overlapping_tags_merge() {
        let tags = vec![
            register("wide", RegisterKind::Holding, 100, RegisterDataType::Float64),
            register("inner", RegisterKind::Holding, 101, RegisterDataType::Int16),
        ];
        let plan = plan_reads(&tags, 0);
        assert_eq!(plan.ranges.len(), 1);
        assert_eq!(plan.ranges[0].count, 4);
    }

    #[test]
    fn request_length_is_capped() {
        let tags: Vec<_> = (0..130u16)
            .map(|i| register(&format!("r{}", i), RegisterKind::Holding, i, RegisterDataType::Int16))
            .collect();
        let plan = plan_reads(&tags, 0);
        assert_eq!(plan.ranges.len(), 2);
        assert_eq!(plan.ranges[0].count, 125);
        assert_eq!(plan.ranges[1].start, 125);
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        let mut bit_on_coil = register("coil", RegisterKind::Coil, 0, RegisterDataType::Bool);
        if let TagAddress::Register(address) = &mut bit_on_coil.address {
            address.bit = Some(1);
        }
        let mut bit_too_high = register("flag", RegisterKind::Holding, 0, RegisterDataType::Bool);
        if let TagAddress::Register(address) = &mut bit_too_high.address {
            address.bit = Some(16);
        }
        let symbol = TagDefinition::new(
            "sym",
            TagAddress::Symbol(SymbolAddress {
                path: "MAIN.X".to_string(),
                data_type: SymbolDataType::Int,
                length: None,
            }),
        );
        let overflow = register("end", RegisterKind::Holding, u16::MAX, RegisterDataType::Float32);

        let plan = plan_reads(&[bit_on_coil, bit_too_high, symbol, overflow], 0);
        assert!(plan.ranges.is_empty());
        let rejected: Vec<usize> = plan.rejected.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(rejected, vec![0, 1, 2, 3]);
        assert!(plan
            .rejected
            .iter()
            .all(|(_, err)| matches!(err, ReadError::Config(_))));
    }
}
