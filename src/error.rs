//! 에러 타입 정의

use thiserror::Error;

/// 와이어 코덱 에러
#[derive(Debug, Error)]
pub enum CodecError {
    /// 길이 프리픽스(4바이트)조차 없는 바이너리 프레임
    #[error("buffer too short")]
    BufferTooShort,

    /// 선언된 메타데이터 길이보다 프레임이 짧음
    #[error("buffer too short for metadata (declared {declared} bytes, {available} available)")]
    BufferTooShortForMetadata { declared: usize, available: usize },

    #[error("metadata of {0} bytes does not fit a u32 length prefix")]
    MetadataTooLarge(usize),

    /// 메시지 JSON이 객체가 아님 (배열, 원시값 등)
    #[error("message must be a JSON object")]
    NotAnObject,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// 메시지 중계 에러
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to encode downlink: {0}")]
    Codec(#[from] CodecError),

    /// 송신자의 방이 레지스트리에 없음 (teardown과 경합)
    #[error("room {0} not found")]
    RoomNotFound(String),

    /// 같은 peer_id로 더 새로운 연결이 슬롯을 차지함
    #[error("peer {peer_id} in room {room_id} was superseded by a newer connection")]
    StaleSession { room_id: String, peer_id: String },

    /// 대상 피어의 송신 큐가 가득 참 (느리거나 멈춘 피어)
    #[error("outbound queue of peer {0} is full")]
    QueueFull(String),

    /// 대상 피어의 송신 채널이 이미 닫힘
    #[error("peer {0} is no longer connected")]
    PeerGone(String),
}
