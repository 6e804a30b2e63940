//! 协议错误类型定义

/// 建立连接失败。
///
/// 驱动监控状态机进入退避重连，不会使调度器退出。
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// 目标拒绝连接
    #[error("connection refused: {0}")]
    Refused(String),

    /// 连接超时
    #[error("connect timeout after {0}ms")]
    Timeout(u64),

    /// 目标拒绝路由（ADS 未配置路由时表现为握手阶段断开）
    #[error("route rejected: {0}")]
    Auth(String),

    /// 符号句柄解析失败
    #[error("handle resolution failed: {0}")]
    HandleResolution(String),

    /// 端点配置错误
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// 将 TCP 建连的 IO 错误归类。
    pub fn from_connect_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => Self::Refused(err.to_string()),
            std::io::ErrorKind::TimedOut => Self::Timeout(0),
            _ => Self::Io(err),
        }
    }
}

/// 读取失败。
///
/// 单个标签的失败只降级该标签的质量位；整批失败时本周期不落库。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadError {
    /// 未连接
    #[error("not connected")]
    NotConnected,

    /// 请求超时
    #[error("read timeout after {0}ms")]
    Timeout(u64),

    /// 传输层错误（连接已不可用）
    #[error("transport error: {0}")]
    Transport(String),

    /// Modbus 异常响应
    #[error("modbus exception: {0}")]
    Exception(String),

    /// ADS 错误码
    #[error("ads error {code:#06x}: {message}")]
    Ads { code: u32, message: &'static str },

    /// 数据解析错误 / 值超出范围
    #[error("decode error: {0}")]
    Decode(String),

    /// 标签配置错误（首次使用时暴露）
    #[error("tag config error: {0}")]
    Config(String),
}

impl ReadError {
    /// 传输层整体失败，需要断开重连。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Transport(_))
    }

    pub fn ads(code: u32) -> Self {
        Self::Ads {
            code,
            message: crate::ads::ads_error_message(code),
        }
    }

    pub(crate) fn from_io(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
