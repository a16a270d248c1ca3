//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::error::RelayError;
use crate::handlers::Relay;
use crate::protocol::Frame;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use uuid::Uuid;

/// 연결별 송신 큐 크기. 가득 차면 해당 피어로의 전달만 실패한다.
pub const OUTBOUND_QUEUE_SIZE: usize = 256;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 방 레지스트리
    pub registry: Arc<RoomRegistry>,
    /// 메시지 중계기
    pub relay: Relay,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        Self {
            relay: Relay::new(registry.clone(), config.manual_delay()),
            registry,
        }
    }
}

/// 연결 송신 태스크로 보내는 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    Close { code: u16, reason: &'static str },
}

/// 피어 연결 핸들
///
/// 실제 소켓 쓰기는 연결마다 하나인 송신 태스크가 맡는다.
/// `conn_id`로 같은 peer_id의 이전/이후 연결을 구분한다.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    peer_id: String,
    conn_id: Uuid,
    sender: mpsc::Sender<Outbound>,
}

impl PeerHandle {
    pub fn new(peer_id: impl Into<String>, sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            peer_id: peer_id.into(),
            conn_id: Uuid::new_v4(),
            sender,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn is_same_connection(&self, other: &PeerHandle) -> bool {
        self.conn_id == other.conn_id
    }

    /// 송신 큐에 프레임을 넣는다. 큐가 가득 차도 기다리지 않는다.
    pub fn send(&self, frame: Frame) -> Result<(), RelayError> {
        self.sender
            .try_send(Outbound::Frame(frame))
            .map_err(|e| match e {
                TrySendError::Full(_) => RelayError::QueueFull(self.peer_id.clone()),
                TrySendError::Closed(_) => RelayError::PeerGone(self.peer_id.clone()),
            })
    }

    /// 송신 태스크에 close 프레임 전송을 요청 (이미 닫혔으면 무시)
    ///
    /// 큐가 가득 차 있으면 자리가 날 때까지 백그라운드에서 기다린다.
    pub fn close(&self, code: u16, reason: &'static str) {
        let close = Outbound::Close { code, reason };
        if let Err(TrySendError::Full(close)) = self.sender.try_send(close) {
            let sender = self.sender.clone();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = sender.send(close).await;
                });
            }
        }
    }
}

type Members = HashMap<String, PeerHandle>;

/// 입장 결과
#[derive(Debug)]
pub struct Joined {
    /// 입장 직후 방 멤버 스냅샷 (입장한 피어 포함)
    pub members: Vec<PeerHandle>,
    /// 같은 peer_id로 등록되어 있던 이전 연결
    pub superseded: Option<PeerHandle>,
}

/// 퇴장 결과
#[derive(Debug)]
pub enum LeaveOutcome {
    /// 이미 다른 연결로 대체되었거나 등록된 적 없음
    NotMember,
    /// 마지막 멤버가 나가서 방이 삭제됨
    RoomEmpty,
    /// 남은 멤버 스냅샷
    Remaining(Vec<PeerHandle>),
}

/// 방 레지스트리 (room_id -> peer_id -> PeerHandle)
///
/// 레지스트리 전체를 하나의 RwLock이 보호한다. 임계 구역은 맵 조작만 하고
/// 네트워크 전송은 항상 락을 놓은 뒤에 한다.
/// 방은 멤버가 한 명 이상일 때만 존재한다.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Members>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 방에 피어 등록 (없으면 방 생성, 같은 peer_id는 교체)
    pub async fn join(&self, room_id: &str, handle: PeerHandle) -> Joined {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room_id.to_string()).or_default();
        let superseded = members.insert(handle.peer_id.clone(), handle);

        Joined {
            members: members.values().cloned().collect(),
            superseded,
        }
    }

    /// 방에서 피어 제거, 비면 방도 삭제
    pub async fn leave(&self, room_id: &str, handle: &PeerHandle) -> LeaveOutcome {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room_id) else {
            return LeaveOutcome::NotMember;
        };

        match members.get(handle.peer_id()) {
            Some(current) if current.is_same_connection(handle) => {
                members.remove(handle.peer_id());
            }
            _ => return LeaveOutcome::NotMember,
        }

        if members.is_empty() {
            rooms.remove(room_id);
            LeaveOutcome::RoomEmpty
        } else {
            LeaveOutcome::Remaining(members.values().cloned().collect())
        }
    }

    /// 브로드캐스트용 멤버 스냅샷
    pub async fn snapshot(&self, room_id: &str) -> Option<Vec<PeerHandle>> {
        self.with_room(room_id, |members| members.values().cloned().collect())
            .await
    }

    /// 읽기 락 안에서 방 멤버 맵을 조회한다. `f`에서 I/O를 하면 안 된다.
    pub async fn with_room<R>(
        &self,
        room_id: &str,
        f: impl FnOnce(&HashMap<String, PeerHandle>) -> R,
    ) -> Option<R> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(f)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }
}
