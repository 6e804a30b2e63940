//! ADS 请求 / 响应客户端（单连接，串行请求）。

use super::frame::{
    encode_request, parse_tcp_header, AmsAddr, AmsHeader, Command, AMS_HEADER_LEN,
    TCP_HEADER_LEN,
};
use crate::error::ReadError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

/// 单个 AMS 报文长度上限，超过视为流已错位。
pub(super) const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// ADS 连接使用的字节流。
pub trait AdsStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AdsStream for T {}

/// 设备状态（ReadState 响应）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub ads_state: u16,
    pub device_state: u16,
}

pub struct AdsClient {
    stream: Box<dyn AdsStream>,
    target: AmsAddr,
    source: AmsAddr,
    next_invoke_id: u32,
    io_timeout: Duration,
}

impl AdsClient {
    pub fn new(
        stream: Box<dyn AdsStream>,
        target: AmsAddr,
        source: AmsAddr,
        io_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            target,
            source,
            next_invoke_id: 1,
            io_timeout,
        }
    }

    /// 发送一个请求并等待匹配的响应，返回响应数据区。
    ///
    /// 超时后流的帧边界不再可信，调用方需断开连接。
    async fn request(&mut self, command: Command, payload: &[u8]) -> Result<Bytes, ReadError> {
        let invoke_id = self.next_invoke_id;
        self.next_invoke_id = self.next_invoke_id.wrapping_add(1).max(1);
        let timeout_ms = self.io_timeout.as_millis() as u64;

        timeout(self.io_timeout, self.round_trip(command, invoke_id, payload))
            .await
            .map_err(|_| ReadError::Timeout(timeout_ms))?
    }

    async fn round_trip(
        &mut self,
        command: Command,
        invoke_id: u32,
        payload: &[u8],
    ) -> Result<Bytes, ReadError> {
        let frame = encode_request(self.target, self.source, command, invoke_id, payload);
        self.stream
            .write_all(&frame)
            .await
            .map_err(ReadError::from_io)?;
        self.stream.flush().await.map_err(ReadError::from_io)?;

        loop {
            let mut tcp = [0u8; TCP_HEADER_LEN];
            self.stream
                .read_exact(&mut tcp)
                .await
                .map_err(ReadError::from_io)?;
            let len = parse_tcp_header(&tcp);
            if !(AMS_HEADER_LEN..=MAX_FRAME_LEN).contains(&len) {
                return Err(ReadError::Transport(format!("invalid AMS length {}", len)));
            }
            let mut body = vec![0u8; len];
            self.stream
                .read_exact(&mut body)
                .await
                .map_err(ReadError::from_io)?;

            let header = AmsHeader::parse(&body)?;
            if !header.is_response() || header.invoke_id != invoke_id {
                // 过期响应或设备通知，丢弃
                trace!(
                    target: "plc.protocol.ads",
                    invoke_id = header.invoke_id,
                    command = header.command,
                    "skip_unmatched_frame"
                );
                continue;
            }
            if header.error_code != 0 {
                return Err(ReadError::ads(header.error_code));
            }
            return Ok(Bytes::from(body).slice(AMS_HEADER_LEN..));
        }
    }

    fn result_code(data: &mut Bytes) -> Result<(), ReadError> {
        if data.remaining() < 4 {
            return Err(ReadError::Transport("short ADS response".to_string()));
        }
        match data.get_u32_le() {
            0 => Ok(()),
            code => Err(ReadError::ads(code)),
        }
    }

    fn length_prefixed(mut data: Bytes) -> Result<Bytes, ReadError> {
        Self::result_code(&mut data)?;
        if data.remaining() < 4 {
            return Err(ReadError::Transport("short ADS response".to_string()));
        }
        let len = data.get_u32_le() as usize;
        if data.remaining() < len {
            return Err(ReadError::Transport(format!(
                "ADS response truncated: expected {} bytes, got {}",
                len,
                data.remaining()
            )));
        }
        Ok(data.slice(..len))
    }

    pub async fn read_state(&mut self) -> Result<DeviceState, ReadError> {
        let mut data = self.request(Command::ReadState, &[]).await?;
        Self::result_code(&mut data)?;
        if data.remaining() < 4 {
            return Err(ReadError::Transport("short ReadState response".to_string()));
        }
        Ok(DeviceState {
            ads_state: data.get_u16_le(),
            device_state: data.get_u16_le(),
        })
    }

    pub async fn read(
        &mut self,
        index_group: u32,
        index_offset: u32,
        length: u32,
    ) -> Result<Bytes, ReadError> {
        let mut payload = BytesMut::with_capacity(12);
        payload.put_u32_le(index_group);
        payload.put_u32_le(index_offset);
        payload.put_u32_le(length);
        let data = self.request(Command::Read, &payload).await?;
        Self::length_prefixed(data)
    }

    pub async fn write(
        &mut self,
        index_group: u32,
        index_offset: u32,
        value: &[u8],
    ) -> Result<(), ReadError> {
        let mut payload = BytesMut::with_capacity(12 + value.len());
        payload.put_u32_le(index_group);
        payload.put_u32_le(index_offset);
        payload.put_u32_le(value.len() as u32);
        payload.put_slice(value);
        let mut data = self.request(Command::Write, &payload).await?;
        Self::result_code(&mut data)
    }

    pub async fn read_write(
        &mut self,
        index_group: u32,
        index_offset: u32,
        read_length: u32,
        value: &[u8],
    ) -> Result<Bytes, ReadError> {
        let mut payload = BytesMut::with_capacity(16 + value.len());
        payload.put_u32_le(index_group);
        payload.put_u32_le(index_offset);
        payload.put_u32_le(read_length);
        payload.put_u32_le(value.len() as u32);
        payload.put_slice(value);
        let data = self.request(Command::ReadWrite, &payload).await?;
        Self::length_prefixed(data)
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
