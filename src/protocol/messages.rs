//! 업링크/다운링크 메시지 정의

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// 방 멤버 목록 갱신에 예약된 action
pub const UPDATE_PEERS_ACTION: &str = "__update_peers__";

/// 서버가 생성한 다운링크의 발신자 ID
pub const SERVER_PEER_ID: &str = "server";

/// 메시지 데이터: 구조화된 JSON 또는 원시 바이너리
///
/// `Binary`는 JSON으로 직렬화되지 않는다. 메시지에 바이너리 데이터가 있으면
/// 코덱이 `data` 키를 생략한 메타데이터를 만들고 페이로드를 프레임 뒤에 붙인다.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary(bytes) => Some(bytes),
            Payload::Json(_) => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Json(value) => value.serialize(serializer),
            Payload::Binary(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Payload::Json)
    }
}

/// JSON 텍스트에 `data` 키를 쓸지 여부 (바이너리는 프레임 본문으로 간다)
fn omit_from_json(data: &Option<Payload>) -> bool {
    !matches!(data, Some(Payload::Json(_)))
}

/// 전달 대상 피어
///
/// 문자열 하나는 단일 대상, 배열은 문자열 원소만 순서대로 사용한다.
/// 그 외 JSON 타입은 대상 없음으로 해석된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TargetPeers {
    Peer(String),
    Peers(Vec<String>),
}

impl TargetPeers {
    pub fn ids(&self) -> &[String] {
        match self {
            TargetPeers::Peer(id) => std::slice::from_ref(id),
            TargetPeers::Peers(ids) => ids,
        }
    }
}

impl<'de> Deserialize<'de> for TargetPeers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(id) => TargetPeers::Peer(id),
            Value::Array(items) => TargetPeers::Peers(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(id) => Some(id),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => TargetPeers::Peers(Vec::new()),
        })
    }
}

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UplinkMessage {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "omit_from_json")]
    pub data: Option<Payload>,
    /// 없으면 방 전체에 브로드캐스트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_peers: Option<TargetPeers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl UplinkMessage {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: None,
            target_peers: None,
            metadata: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Payload>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_targets(mut self, targets: TargetPeers) -> Self {
        self.target_peers = Some(targets);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlinkMessage {
    pub action: String,
    #[serde(default, skip_serializing_if = "omit_from_json")]
    pub data: Option<Payload>,
    /// 발신 피어 ID, 서버 메시지는 `"server"`
    pub peer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl DownlinkMessage {
    /// 피어가 보낸 업링크를 다른 피어에게 전달할 형태로 변환
    pub fn relayed(uplink: UplinkMessage, from_peer_id: &str) -> Self {
        Self {
            action: uplink.action,
            data: uplink.data,
            peer_id: from_peer_id.to_string(),
            metadata: uplink.metadata,
        }
    }

    /// 방 멤버 목록 갱신 메시지
    pub fn peer_list(peer_ids: Vec<String>) -> Self {
        Self {
            action: UPDATE_PEERS_ACTION.to_string(),
            data: Some(Payload::Json(Value::from(peer_ids))),
            peer_id: SERVER_PEER_ID.to_string(),
            metadata: None,
        }
    }

    pub fn is_peer_list(&self) -> bool {
        self.action == UPDATE_PEERS_ACTION && self.peer_id == SERVER_PEER_ID
    }

    /// 멤버 목록 갱신이면 피어 ID 목록을 꺼낸다
    pub fn peer_ids(&self) -> Option<Vec<String>> {
        if !self.is_peer_list() {
            return None;
        }
        match &self.data {
            Some(Payload::Json(value)) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}
