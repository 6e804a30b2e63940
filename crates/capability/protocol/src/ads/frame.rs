//! AMS/TCP 帧编解码
//!
//! ```text
//! | reserved u16 | length u32 |                      (AMS/TCP 头，6 字节)
//! | target netid 6 | target port u16 | source netid 6 | source port u16 |
//! | command u16 | state flags u16 | data length u32 | error code u32 | invoke id u32 |
//! | data ... |
//! ```
//!
//! 所有字段均为小端。

use crate::error::{ConnectionError, ReadError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::str::FromStr;

pub const TCP_HEADER_LEN: usize = 6;
pub const AMS_HEADER_LEN: usize = 32;

/// 请求帧状态位：ADS 命令
pub const STATE_REQUEST: u16 = 0x0004;
/// 响应位
pub const STATE_RESPONSE: u16 = 0x0001;

/// ADS 命令号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Read = 2,
    Write = 3,
    ReadState = 4,
    ReadWrite = 9,
}

/// AMS 网络地址（6 段点分）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AmsNetId(pub [u8; 6]);

impl FromStr for AmsNetId {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 6 {
            return Err(ConnectionError::Endpoint(format!(
                "AMS net id must have 6 parts: {}",
                s
            )));
        }
        let mut id = [0u8; 6];
        for (slot, part) in id.iter_mut().zip(parts) {
            *slot = part
                .parse()
                .map_err(|_| ConnectionError::Endpoint(format!("invalid AMS net id: {}", s)))?;
        }
        Ok(Self(id))
    }
}

impl fmt::Display for AmsNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{}.{}.{}.{}.{}.{}", a, b, c, d, e, g)
    }
}

impl AmsNetId {
    /// 由 IPv4 地址派生：`a.b.c.d.1.1`。
    pub fn from_ipv4(ip: std::net::Ipv4Addr) -> Self {
        let [a, b, c, d] = ip.octets();
        Self([a, b, c, d, 1, 1])
    }
}

/// AMS 地址：网络地址 + 端口。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmsAddr {
    pub net_id: AmsNetId,
    pub port: u16,
}

/// AMS 头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmsHeader {
    pub target: AmsAddr,
    pub source: AmsAddr,
    pub command: u16,
    pub state_flags: u16,
    pub data_len: u32,
    pub error_code: u32,
    pub invoke_id: u32,
}

impl AmsHeader {
    pub fn is_response(&self) -> bool {
        self.state_flags & STATE_RESPONSE != 0
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.target.net_id.0);
        buf.put_u16_le(self.target.port);
        buf.put_slice(&self.source.net_id.0);
        buf.put_u16_le(self.source.port);
        buf.put_u16_le(self.command);
        buf.put_u16_le(self.state_flags);
        buf.put_u32_le(self.data_len);
        buf.put_u32_le(self.error_code);
        buf.put_u32_le(self.invoke_id);
    }

    /// 解析 32 字节 AMS 头。
    pub fn parse(mut buf: &[u8]) -> Result<Self, ReadError> {
        if buf.len() < AMS_HEADER_LEN {
            return Err(ReadError::Transport(format!(
                "short AMS header: {} bytes",
                buf.len()
            )));
        }
        let mut addr = || {
            let mut net_id = [0u8; 6];
            buf.copy_to_slice(&mut net_id);
            AmsAddr {
                net_id: AmsNetId(net_id),
                port: buf.get_u16_le(),
            }
        };
        let target = addr();
        let source = addr();
        Ok(Self {
            target,
            source,
            command: buf.get_u16_le(),
            state_flags: buf.get_u16_le(),
            data_len: buf.get_u32_le(),
            error_code: buf.get_u32_le(),
            invoke_id: buf.get_u32_le(),
        })
    }
}

/// 编码完整请求帧（含 AMS/TCP 头）。
pub fn encode_request(
    target: AmsAddr,
    source: AmsAddr,
    command: Command,
    invoke_id: u32,
    payload: &[u8],
) -> Bytes {
    encode_frame(
        &AmsHeader {
            target,
            source,
            command: command as u16,
            state_flags: STATE_REQUEST,
            data_len: payload.len() as u32,
            error_code: 0,
            invoke_id,
        },
        payload,
    )
}

/// 编码任意帧；测试中的模拟设备也用它构造响应。
pub fn encode_frame(header: &AmsHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(TCP_HEADER_LEN + AMS_HEADER_LEN + payload.len());
    buf.put_u16_le(0);
    buf.put_u32_le((AMS_HEADER_LEN + payload.len()) as u32);
    header.put(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}

/// 解析 AMS/TCP 头，返回后续 AMS 报文长度。
pub fn parse_tcp_header(buf: &[u8; TCP_HEADER_LEN]) -> usize {
    u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_id_parse_and_display() {
        let id: AmsNetId = "5.12.34.56.1.1".parse().unwrap();
        assert_eq!(id.0, [5, 12, 34, 56, 1, 1]);
        assert_eq!(id.to_string(), "5.12.34.56.1.1");
        assert!("5.12.34.56.1".parse::<AmsNetId>().is_err());
        assert!("5.12.34.56.1.300".parse::<AmsNetId>().is_err());
        assert_eq!(
            AmsNetId::from_ipv4(std::net::Ipv4Addr::new(192, 168, 0, 10)).to_string(),
            "192.168.0.10.1.1"
        );
    }

    #[test]
    fn request_layout() {
        let target = AmsAddr {
            net_id: AmsNetId([1, 2, 3, 4, 1, 1]),
            port: 851,
        };
        let source = AmsAddr {
            net_id: AmsNetId([10, 0, 0, 1, 1, 1]),
            port: 32905,
        };
        let frame = encode_request(target, source, Command::Read, 7, &[0xAA, 0xBB]);
        assert_eq!(frame.len(), TCP_HEADER_LEN + AMS_HEADER_LEN + 2);

        let mut tcp = [0u8; TCP_HEADER_LEN];
        tcp.copy_from_slice(&frame[..TCP_HEADER_LEN]);
        assert_eq!(parse_tcp_header(&tcp), AMS_HEADER_LEN + 2);

        let header = AmsHeader::parse(&frame[TCP_HEADER_LEN..]).unwrap();
        assert_eq!(header.target, target);
        assert_eq!(header.source, source);
        assert_eq!(header.command, Command::Read as u16);
        assert_eq!(header.state_flags, STATE_REQUEST);
        assert_eq!(header.data_len, 2);
        assert_eq!(header.invoke_id, 7);
        assert!(!header.is_response());
        assert_eq!(&frame[TCP_HEADER_LEN + AMS_HEADER_LEN..], &[0xAA, 0xBB]);
    }

    #[test]
    fn short_header_is_transport_error() {
        assert!(matches!(
            AmsHeader::parse(&[0u8; 10]),
            Err(ReadError::Transport(_))
        ));
    }
}
