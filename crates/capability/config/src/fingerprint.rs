//! 配置指纹：标签集合与协议端点的规范化摘要。
//!
//! 仅包含会改变存储内容含义的字段；轮询周期、超时等不参与计算。

use domain::{ConfigFingerprint, TagAddress, TagDefinition};
use plc_protocol::EndpointSettings;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// 指纹取 SHA-256 的前 8 字节（16 个十六进制字符）。
const FINGERPRINT_BYTES: usize = 8;

#[derive(Serialize)]
struct CanonicalTag {
    name: String,
    address: TagAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<f64>,
}

#[derive(Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "protocol", rename_all = "snake_case")]
enum CanonicalEndpoint {
    Modbus {
        host: String,
        port: u16,
        unit_id: u8,
    },
    Ads {
        host: String,
        port: u16,
        ams_net_id: Option<String>,
        ams_port: u16,
    },
}

#[derive(Serialize)]
struct Canonical {
    endpoints: Vec<CanonicalEndpoint>,
    tags: Vec<CanonicalTag>,
}

fn canonical_tag(tag: &TagDefinition) -> CanonicalTag {
    let mut address = tag.address.clone();
    if let TagAddress::Symbol(symbol) = &mut address {
        symbol.path = symbol.path.trim().to_string();
    }
    CanonicalTag {
        name: tag.name.trim().to_string(),
        address,
        scale: tag.scale,
        offset: tag.offset,
    }
}

fn canonical_endpoint(endpoint: &EndpointSettings) -> CanonicalEndpoint {
    match endpoint {
        EndpointSettings::Modbus(settings) => CanonicalEndpoint::Modbus {
            host: settings.host.trim().to_string(),
            port: settings.port,
            unit_id: settings.unit_id,
        },
        EndpointSettings::Ads(settings) => CanonicalEndpoint::Ads {
            host: settings.host.trim().to_string(),
            port: settings.port,
            // 显式配置与由主机推导出的同一 NetId 视为相同
            ams_net_id: settings
                .target_net_id()
                .map(|net_id| net_id.to_string())
                .ok()
                .or_else(|| {
                    settings
                        .ams_net_id
                        .as_ref()
                        .map(|net_id| net_id.trim().to_string())
                }),
            ams_port: settings.ams_port,
        },
    }
}

/// 计算配置指纹。
///
/// 只统计启用的标签；名称与符号路径去除首尾空白后按名称排序，
/// 因此标签顺序和空白不影响结果。
pub fn fingerprint(tags: &[TagDefinition], endpoints: &[EndpointSettings]) -> ConfigFingerprint {
    let mut canonical_tags: Vec<CanonicalTag> = tags
        .iter()
        .filter(|tag| tag.enabled)
        .map(canonical_tag)
        .collect();
    canonical_tags.sort_by(|a, b| a.name.cmp(&b.name));

    let mut canonical_endpoints: Vec<CanonicalEndpoint> =
        endpoints.iter().map(canonical_endpoint).collect();
    canonical_endpoints.sort();

    let canonical = Canonical {
        endpoints: canonical_endpoints,
        tags: canonical_tags,
    };
    // 结构体序列化不会失败；非有限浮点数会被写成 null
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    ConfigFingerprint::from_digest(&digest[..FINGERPRINT_BYTES])
}
