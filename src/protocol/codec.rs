//! 와이어 코덱
//!
//! 텍스트 프레임은 메시지 JSON 그대로, 바이너리 프레임은 아래 레이아웃을 쓴다.
//!
//! ```text
//! [u32 LE: 메타데이터 길이][메타데이터 JSON (data 제외)][원시 페이로드]
//! ```

use super::messages::{DownlinkMessage, Payload, UplinkMessage};
use crate::error::CodecError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

const LENGTH_PREFIX: usize = 4;

/// 인코딩된 프레임과 전송 타입
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }
}

/// 바이너리 데이터와 JSON 메타데이터를 하나의 버퍼로 묶는다
pub fn pack_buffer_json<T: Serialize + ?Sized>(
    data: &[u8],
    metadata: &T,
) -> Result<Vec<u8>, CodecError> {
    let metadata = serde_json::to_vec(metadata)?;
    let metadata_len =
        u32::try_from(metadata.len()).map_err(|_| CodecError::MetadataTooLarge(metadata.len()))?;

    let mut packed = Vec::with_capacity(LENGTH_PREFIX + metadata.len() + data.len());
    packed.extend_from_slice(&metadata_len.to_le_bytes());
    packed.extend_from_slice(&metadata);
    packed.extend_from_slice(data);
    Ok(packed)
}

/// 패킹된 버퍼를 (페이로드, 메타데이터 JSON) 슬라이스로 나눈다
pub fn unpack_buffer_json(buffer: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    let Some((prefix, rest)) = buffer.split_first_chunk::<LENGTH_PREFIX>() else {
        return Err(CodecError::BufferTooShort);
    };

    let declared = u32::from_le_bytes(*prefix) as usize;
    if rest.len() < declared {
        return Err(CodecError::BufferTooShortForMetadata {
            declared,
            available: rest.len(),
        });
    }

    let (metadata, payload) = rest.split_at(declared);
    Ok((payload, metadata))
}

fn encode<T: Serialize>(message: &T, data: Option<&Payload>) -> Result<Frame, CodecError> {
    match data.and_then(Payload::as_binary) {
        // 바이너리 데이터는 메시지 직렬화에서 자동으로 빠진다
        Some(bytes) => pack_buffer_json(bytes, message).map(Frame::Binary),
        None => Ok(Frame::Text(serde_json::to_string(message)?)),
    }
}

pub fn encode_downlink(message: &DownlinkMessage) -> Result<Frame, CodecError> {
    encode(message, message.data.as_ref())
}

pub fn encode_uplink(message: &UplinkMessage) -> Result<Frame, CodecError> {
    encode(message, message.data.as_ref())
}

/// JSON 객체만 메시지로 받는다. 파생 구조체 역직렬화는 배열도 위치 순서로 채우므로 먼저 거른다.
fn parse_message<T: DeserializeOwned>(input: &[u8]) -> Result<T, CodecError> {
    match serde_json::from_slice::<Value>(input)? {
        value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
        _ => Err(CodecError::NotAnObject),
    }
}

/// 수신 프레임을 업링크 메시지로 해석
pub fn decode_uplink(input: &[u8], is_binary: bool) -> Result<UplinkMessage, CodecError> {
    if !is_binary {
        return parse_message(input);
    }

    let (payload, metadata) = unpack_buffer_json(input)?;
    let mut message: UplinkMessage = parse_message(metadata)?;
    message.data = Some(Payload::Binary(payload.to_vec()));
    Ok(message)
}

pub fn decode_downlink(input: &[u8], is_binary: bool) -> Result<DownlinkMessage, CodecError> {
    if !is_binary {
        return parse_message(input);
    }

    let (payload, metadata) = unpack_buffer_json(input)?;
    let mut message: DownlinkMessage = parse_message(metadata)?;
    message.data = Some(Payload::Binary(payload.to_vec()));
    Ok(message)
}
