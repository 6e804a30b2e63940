//! ADS 符号寻址适配器
//!
//! 通过 AMS/TCP（默认端口 48898）访问 PLC 运行时，按符号路径解析句柄后批量读取。
//!
//! ## 读取流程
//!
//! ```text
//! connect ──► ReadState 握手 ──► 读取符号版本
//!
//! read_batch
//!   ├── 句柄缓存未命中 → ReadWrite(0xF003) 解析句柄
//!   ├── Sum Read (0xF080) 一次往返读取全部句柄
//!   │     └── 设备不支持 (0x701) → 逐个 Read(0xF005)
//!   └── 句柄失效 (0x710 / 0x711) → 清空缓存，下周期重新解析
//! ```

mod client;
mod codec;
pub mod frame;

pub use client::{AdsClient, AdsStream, DeviceState};
pub use codec::decode_symbol;

use crate::adapter::ProtocolAdapter;
use crate::error::{ConnectionError, ReadError};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::Utc;
use domain::{ProtocolKind, Sample, SampleBatch, SymbolDataType, TagAddress, TagDefinition};
use frame::{AmsAddr, AmsNetId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 按名称获取句柄
pub const ADSIGRP_SYM_HNDBYNAME: u32 = 0xF003;
/// 按句柄读写值
pub const ADSIGRP_SYM_VALBYHND: u32 = 0xF005;
/// 释放句柄
pub const ADSIGRP_SYM_RELEASEHND: u32 = 0xF006;
/// 符号表版本
pub const ADSIGRP_SYM_VERSION: u32 = 0xF008;
/// Sum Read（批量读取）
pub const ADSIGRP_SUMUP_READ: u32 = 0xF080;

pub const ADSERR_TARGET_PORT_NOT_FOUND: u32 = 0x006;
pub const ADSERR_TARGET_MACHINE_NOT_FOUND: u32 = 0x007;
pub const ADSERR_DEVICE_SRVNOTSUPP: u32 = 0x701;
pub const ADSERR_DEVICE_SYMBOLNOTFOUND: u32 = 0x710;
pub const ADSERR_DEVICE_SYMBOLVERSIONINVALID: u32 = 0x711;

/// 单个符号值的字节上限（须能放进一个 AMS 响应报文）。
const MAX_VALUE_LEN: u32 = (client::MAX_FRAME_LEN / 2) as u32;

/// Sum Read 响应数据区长度；溢出或超出单个报文时为 None。
fn sum_read_len(items: &[(usize, u32, u32)]) -> Option<u32> {
    items
        .iter()
        .try_fold(0u32, |total, (_, _, size)| {
            total.checked_add(4)?.checked_add(*size)
        })
        .filter(|len| *len as usize <= MAX_VALUE_LEN as usize)
}

/// ADS 错误码描述
pub fn ads_error_message(code: u32) -> &'static str {
    match code {
        0x001 => "internal error",
        0x006 => "target port not found",
        0x007 => "target machine not found",
        0x700 => "device error",
        0x701 => "service not supported",
        0x702 => "invalid index group",
        0x703 => "invalid index offset",
        0x704 => "reading/writing not permitted",
        0x705 => "parameter size not correct",
        0x706 => "invalid parameter value",
        0x707 => "device not ready",
        0x708 => "device busy",
        0x70A => "out of memory",
        0x710 => "symbol not found",
        0x711 => "symbol version invalid",
        0x712 => "device in invalid state",
        0x745 => "device timeout",
        0x746 => "device unknown error",
        _ => "unknown ads error",
    }
}

/// ADS 连接设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsSettings {
    /// PLC 主机地址
    pub host: String,
    /// AMS/TCP 端口（默认 48898）
    #[serde(default = "default_ads_tcp_port")]
    pub port: u16,
    /// 目标 AMS 地址；未配置时由 IPv4 主机地址派生 `a.b.c.d.1.1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ams_net_id: Option<String>,
    /// 目标 AMS 端口（TwinCAT 3 PLC 默认 851）
    #[serde(default = "default_ams_port")]
    pub ams_port: u16,
    /// 本机 AMS 地址；未配置时由本地 IP 派生
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ams_net_id: Option<String>,
    #[serde(default = "default_local_ams_port")]
    pub local_ams_port: u16,
    /// 单次请求超时（毫秒）
    #[serde(default = "crate::modbus::default_io_timeout")]
    pub io_timeout_ms: u64,
}

fn default_ads_tcp_port() -> u16 {
    48898
}

fn default_ams_port() -> u16 {
    851
}

fn default_local_ams_port() -> u16 {
    32905
}

impl AdsSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ads_tcp_port(),
            ams_net_id: None,
            ams_port: default_ams_port(),
            local_ams_net_id: None,
            local_ams_port: default_local_ams_port(),
            io_timeout_ms: crate::modbus::default_io_timeout(),
        }
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ConnectionError> {
        serde_json::from_str(json).map_err(|e| ConnectionError::Endpoint(e.to_string()))
    }

    /// 目标 AMS 网络地址
    pub fn target_net_id(&self) -> Result<AmsNetId, ConnectionError> {
        if let Some(net_id) = &self.ams_net_id {
            return net_id.parse();
        }
        self.host
            .parse::<Ipv4Addr>()
            .map(AmsNetId::from_ipv4)
            .map_err(|_| {
                ConnectionError::Endpoint(format!(
                    "ams_net_id is required when host is not an IPv4 address: {}",
                    self.host
                ))
            })
    }

    fn source_net_id(&self, local_ip: Option<IpAddr>) -> Result<AmsNetId, ConnectionError> {
        if let Some(net_id) = &self.local_ams_net_id {
            return net_id.parse();
        }
        match local_ip {
            Some(IpAddr::V4(ip)) => Ok(AmsNetId::from_ipv4(ip)),
            _ => Err(ConnectionError::Endpoint(
                "local_ams_net_id is required without a local IPv4 address".to_string(),
            )),
        }
    }
}

/// 新建立的 AMS/TCP 字节流
pub struct ConnectedStream {
    pub stream: Box<dyn AdsStream>,
    pub local_ip: Option<IpAddr>,
}

/// 建立 AMS/TCP 字节流。
#[async_trait]
pub trait AdsConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<ConnectedStream, ConnectionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpAdsConnector;

#[async_trait]
impl AdsConnector for TcpAdsConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<ConnectedStream, ConnectionError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(ConnectionError::from_connect_io)?;
        let _ = stream.set_nodelay(true);
        let local_ip = stream.local_addr().ok().map(|addr| addr.ip());
        Ok(ConnectedStream {
            stream: Box::new(stream),
            local_ip,
        })
    }
}

/// ADS 符号适配器
pub struct AdsAdapter {
    settings: AdsSettings,
    connector: Arc<dyn AdsConnector>,
    client: Option<AdsClient>,
    /// 符号路径 → 句柄
    handles: HashMap<String, u32>,
    symbol_version: Option<u8>,
    sum_read_supported: bool,
}

impl AdsAdapter {
    pub fn new(settings: AdsSettings) -> Self {
        Self::with_connector(settings, Arc::new(TcpAdsConnector))
    }

    pub fn with_connector(settings: AdsSettings, connector: Arc<dyn AdsConnector>) -> Self {
        Self {
            settings,
            connector,
            client: None,
            handles: HashMap::new(),
            symbol_version: None,
            sum_read_supported: true,
        }
    }

    pub fn settings(&self) -> &AdsSettings {
        &self.settings
    }

    /// 当前缓存的句柄数量
    pub fn cached_handles(&self) -> usize {
        self.handles.len()
    }

    pub fn sum_read_supported(&self) -> bool {
        self.sum_read_supported
    }

    fn client(&mut self) -> Result<&mut AdsClient, ReadError> {
        self.client.as_mut().ok_or(ReadError::NotConnected)
    }

    async fn handshake(&mut self, budget: Duration) -> Result<(), ConnectionError> {
        let budget_ms = budget.as_millis() as u64;
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| ConnectionError::Endpoint("no stream".to_string()))?;

        let state = match timeout(budget, client.read_state()).await {
            Err(_) | Ok(Err(ReadError::Timeout(_))) => {
                return Err(ConnectionError::Timeout(budget_ms))
            }
            Ok(Err(ReadError::Ads { code, message }))
                if code == ADSERR_TARGET_PORT_NOT_FOUND
                    || code == ADSERR_TARGET_MACHINE_NOT_FOUND =>
            {
                return Err(ConnectionError::Refused(format!(
                    "{} (ams port {})",
                    message, self.settings.ams_port
                )))
            }
            // 未配置路由时 TwinCAT 直接关闭连接
            Ok(Err(ReadError::Transport(reason))) => {
                return Err(ConnectionError::Auth(format!(
                    "connection closed during handshake: {}",
                    reason
                )))
            }
            Ok(Err(err)) => return Err(ConnectionError::Refused(err.to_string())),
            Ok(Ok(state)) => state,
        };

        let version = match client.read(ADSIGRP_SYM_VERSION, 0, 1).await {
            Ok(data) => data.first().copied(),
            Err(err) => {
                debug!(
                    target: "plc.protocol.ads",
                    error = %err,
                    "symbol_version_unavailable"
                );
                None
            }
        };
        self.symbol_version = version;

        info!(
            target: "plc.protocol.ads",
            endpoint = %self.endpoint(),
            ads_state = state.ads_state,
            device_state = state.device_state,
            symbol_version = ?version,
            "ads_connected"
        );
        Ok(())
    }

    async fn resolve_handle(&mut self, path: &str) -> Result<u32, ReadError> {
        if let Some(handle) = self.handles.get(path) {
            return Ok(*handle);
        }
        let mut name = path.as_bytes().to_vec();
        name.push(0);
        let mut data = self
            .client()?
            .read_write(ADSIGRP_SYM_HNDBYNAME, 0, 4, &name)
            .await?;
        if data.remaining() < 4 {
            return Err(ReadError::Transport("short handle response".to_string()));
        }
        let handle = data.get_u32_le();
        self.handles.insert(path.to_string(), handle);
        debug!(target: "plc.protocol.ads", path, handle, "handle_resolved");
        Ok(handle)
    }

    /// 一次往返读取全部句柄。响应布局：n 个错误码，随后依次为各值的数据区。
    async fn sum_read(
        &mut self,
        items: &[(usize, u32, u32)],
        read_len: u32,
    ) -> Result<Vec<Result<Bytes, ReadError>>, ReadError> {
        let mut request = BytesMut::with_capacity(items.len() * 12);
        for (_, handle, size) in items {
            request.put_u32_le(ADSIGRP_SYM_VALBYHND);
            request.put_u32_le(*handle);
            request.put_u32_le(*size);
        }

        let mut data = self
            .client()?
            .read_write(ADSIGRP_SUMUP_READ, items.len() as u32, read_len, &request)
            .await?;
        if data.remaining() < read_len as usize {
            return Err(ReadError::Transport(format!(
                "sum read response truncated: expected {} bytes, got {}",
                read_len,
                data.remaining()
            )));
        }

        let codes: Vec<u32> = items.iter().map(|_| data.get_u32_le()).collect();
        Ok(items
            .iter()
            .zip(codes)
            .map(|((_, _, size), code)| {
                let chunk = data.split_to(*size as usize);
                if code == 0 {
                    Ok(chunk)
                } else {
                    Err(ReadError::ads(code))
                }
            })
            .collect())
    }

    async fn serial_read(
        &mut self,
        items: &[(usize, u32, u32)],
    ) -> Result<Vec<Result<Bytes, ReadError>>, ReadError> {
        let mut results = Vec::with_capacity(items.len());
        for (_, handle, size) in items {
            match self.client()?.read(ADSIGRP_SYM_VALBYHND, *handle, *size).await {
                Err(err) if err.is_fatal() || matches!(err, ReadError::Timeout(_)) => {
                    return Err(err)
                }
                result => results.push(result),
            }
        }
        Ok(results)
    }

    async fn read_values(
        &mut self,
        items: &[(usize, u32, u32)],
    ) -> Result<Vec<Result<Bytes, ReadError>>, ReadError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let read_len = sum_read_len(items);
        if read_len.is_none() {
            debug!(
                target: "plc.protocol.ads",
                items = items.len(),
                "sum_read_too_large_serial"
            );
        }
        if let (true, Some(read_len)) = (self.sum_read_supported, read_len) {
            match self.sum_read(items, read_len).await {
                Err(ReadError::Ads { code, .. }) if code == ADSERR_DEVICE_SRVNOTSUPP => {
                    info!(
                        target: "plc.protocol.ads",
                        endpoint = %self.endpoint(),
                        "sum_read_unsupported_fallback_serial"
                    );
                    self.sum_read_supported = false;
                }
                other => return other,
            }
        }
        self.serial_read(items).await
    }

    async fn read_symbols(&mut self, tags: &[TagDefinition]) -> Result<Vec<Sample>, ReadError> {
        let mut slots: Vec<Option<Sample>> = vec![None; tags.len()];
        let mut items: Vec<(usize, u32, u32)> = Vec::with_capacity(tags.len());

        for (idx, tag) in tags.iter().enumerate() {
            let TagAddress::Symbol(address) = &tag.address else {
                slots[idx] = Some(Sample::bad(
                    tag.name.clone(),
                    ReadError::Config("register address on symbol protocol".to_string())
                        .to_string(),
                ));
                continue;
            };
            if address.data_type == SymbolDataType::String && address.length == Some(0) {
                slots[idx] = Some(Sample::bad(
                    tag.name.clone(),
                    ReadError::Config("string length must be positive".to_string()).to_string(),
                ));
                continue;
            }
            if address.byte_size() > MAX_VALUE_LEN {
                slots[idx] = Some(Sample::bad(
                    tag.name.clone(),
                    ReadError::Config(format!(
                        "symbol size {} exceeds {} bytes",
                        address.byte_size(),
                        MAX_VALUE_LEN
                    ))
                    .to_string(),
                ));
                continue;
            }
            match self.resolve_handle(&address.path).await {
                Ok(handle) => items.push((idx, handle, address.byte_size())),
                Err(err) if err.is_fatal() || matches!(err, ReadError::Timeout(_)) => {
                    return Err(err)
                }
                Err(err) => {
                    warn!(
                        target: "plc.protocol.ads",
                        tag = %tag.name,
                        path = %address.path,
                        error = %err,
                        "handle_resolution_failed"
                    );
                    slots[idx] = Some(Sample::bad(
                        tag.name.clone(),
                        ConnectionError::HandleResolution(err.to_string()).to_string(),
                    ));
                }
            }
        }

        let values = self.read_values(&items).await?;
        let mut invalidate = false;
        for ((idx, _, _), value) in items.iter().zip(values) {
            let tag = &tags[*idx];
            let TagAddress::Symbol(address) = &tag.address else {
                continue;
            };
            slots[*idx] = Some(match value.and_then(|raw| decode_symbol(&raw, address)) {
                Ok(value) => Sample::good(tag.name.clone(), tag.apply_scaling(value)),
                Err(err) => {
                    if let ReadError::Ads { code, .. } = err {
                        invalidate |= code == ADSERR_DEVICE_SYMBOLNOTFOUND
                            || code == ADSERR_DEVICE_SYMBOLVERSIONINVALID;
                    }
                    Sample::bad(tag.name.clone(), err.to_string())
                }
            });
        }

        if invalidate {
            self.invalidate_handles().await;
        }

        Ok(slots
            .into_iter()
            .zip(tags)
            .map(|(slot, tag)| {
                slot.unwrap_or_else(|| Sample::bad(tag.name.clone(), "tag not read"))
            })
            .collect())
    }

    /// 句柄失效（PLC 重新下载程序）：释放并清空缓存，刷新符号版本。
    async fn invalidate_handles(&mut self) {
        self.release_handles().await;
        let previous = self.symbol_version;
        if let Ok(client) = self.client() {
            if let Ok(data) = client.read(ADSIGRP_SYM_VERSION, 0, 1).await {
                self.symbol_version = data.first().copied();
            }
        }
        warn!(
            target: "plc.protocol.ads",
            endpoint = %self.endpoint(),
            previous_version = ?previous,
            symbol_version = ?self.symbol_version,
            "symbol_handles_invalidated"
        );
    }

    async fn release_handles(&mut self) {
        let handles: Vec<u32> = self.handles.drain().map(|(_, handle)| handle).collect();
        let Some(client) = self.client.as_mut() else {
            return;
        };
        for handle in handles {
            if let Err(err) = client
                .write(ADSIGRP_SYM_RELEASEHND, 0, &handle.to_le_bytes())
                .await
            {
                if err.is_fatal() || matches!(err, ReadError::Timeout(_)) {
                    break;
                }
            }
        }
    }

    async fn drop_client(&mut self) {
        self.handles.clear();
        if let Some(mut client) = self.client.take() {
            client.shutdown().await;
        }
    }
}

#[async_trait]
impl ProtocolAdapter for AdsAdapter {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Ads
    }

    fn endpoint(&self) -> String {
        format!(
            "{}:{}/{}:{}",
            self.settings.host,
            self.settings.port,
            self.settings
                .ams_net_id
                .clone()
                .unwrap_or_else(|| "auto".to_string()),
            self.settings.ams_port
        )
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn connect(&mut self, budget: Duration) -> Result<(), ConnectionError> {
        if self.client.is_some() {
            return Ok(());
        }
        let target = AmsAddr {
            net_id: self.settings.target_net_id()?,
            port: self.settings.ams_port,
        };
        let connected = timeout(
            budget,
            self.connector.connect(&self.settings.host, self.settings.port),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(budget.as_millis() as u64))??;
        let source = AmsAddr {
            net_id: self.settings.source_net_id(connected.local_ip)?,
            port: self.settings.local_ams_port,
        };

        self.client = Some(AdsClient::new(
            connected.stream,
            target,
            source,
            Duration::from_millis(self.settings.io_timeout_ms),
        ));
        self.handles.clear();
        self.sum_read_supported = true;

        if let Err(err) = self.handshake(budget).await {
            self.drop_client().await;
            return Err(err);
        }
        Ok(())
    }

    async fn read_batch(&mut self, tags: &[TagDefinition]) -> Result<SampleBatch, ReadError> {
        if self.client.is_none() {
            return Err(ReadError::NotConnected);
        }
        let timestamp = Utc::now();
        match self.read_symbols(tags).await {
            Ok(samples) => Ok(SampleBatch::new(timestamp, samples)),
            Err(err) => {
                // 超时后帧边界不可信，按传输失败断开
                let err = match err {
                    ReadError::Timeout(ms) => {
                        ReadError::Transport(format!("ads request timed out after {}ms", ms))
                    }
                    other => other,
                };
                if err.is_fatal() {
                    self.drop_client().await;
                }
                Err(err)
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.client.is_none() {
            return;
        }
        self.release_handles().await;
        self.drop_client().await;
        info!(
            target: "plc.protocol.ads",
            endpoint = %self.endpoint(),
            "ads_disconnected"
        );
    }
}
