use serde::{Deserialize, Serialize};

/// 协议类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// 寄存器寻址（Modbus TCP）
    Modbus,
    /// 符号寻址（ADS）
    Ads,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modbus => "modbus",
            Self::Ads => "ads",
        }
    }

    /// 按名称解析，忽略大小写。
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "modbus" => Some(Self::Modbus),
            "ads" => Some(Self::Ads),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 连接状态机的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// 连接仍打开，但连续失败已超过软阈值
    Degraded,
}

impl ConnectionStatus {
    /// 可以发起读取（Connected / Degraded）。
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Connected | Self::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对外发布的连接健康快照（只读）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub protocol: ProtocolKind,
    pub status: ConnectionStatus,
    pub consecutive_failures: u32,
    pub last_latency_ms: Option<u64>,
    /// 滚动窗口成功率（0.0-1.0），窗口为空时为 None
    pub success_rate: Option<f64>,
    pub window_len: usize,
    /// 下次重连前的退避时长
    pub next_retry_in_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn initial(protocol: ProtocolKind) -> Self {
        Self {
            protocol,
            status: ConnectionStatus::Disconnected,
            consecutive_failures: 0,
            last_latency_ms: None,
            success_rate: None,
            window_len: 0,
            next_retry_in_ms: None,
            last_error: None,
        }
    }
}
