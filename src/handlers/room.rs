//! 방 멤버십 관리 핸들러

use super::connection::CLOSE_SUPERSEDED;
use crate::protocol::{encode_downlink, DownlinkMessage};
use crate::state::{LeaveOutcome, PeerHandle, RoomRegistry};
use std::sync::Arc;

/// 한 연결의 방 멤버십
///
/// `leave`를 호출하지 않고 드롭되면 (패닉 등) 런타임에 퇴장 처리를 넘긴다.
/// 어느 경로든 퇴장은 정확히 한 번 실행된다.
#[derive(Debug)]
pub struct Membership {
    registry: Arc<RoomRegistry>,
    room_id: String,
    handle: PeerHandle,
    left: bool,
}

impl Membership {
    /// 방 입장 후 멤버 전원에게 목록 갱신 전송
    pub async fn join(registry: Arc<RoomRegistry>, room_id: String, handle: PeerHandle) -> Self {
        let joined = registry.join(&room_id, handle.clone()).await;

        if let Some(previous) = joined.superseded {
            tracing::warn!(
                peer_id = %handle.peer_id(),
                room_id = %room_id,
                previous_conn = %previous.conn_id(),
                "Peer id already in room, closing previous connection"
            );
            previous.close(CLOSE_SUPERSEDED, "superseded by a newer connection");
        }

        tracing::info!(
            peer_id = %handle.peer_id(),
            room_id = %room_id,
            conn_id = %handle.conn_id(),
            "Peer joined room"
        );
        broadcast_peer_list(&room_id, &joined.members);

        Self {
            registry,
            room_id,
            handle,
            left: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }

    pub async fn leave(mut self) {
        self.left = true;
        leave_room(&self.registry, &self.room_id, &self.handle).await;
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        if self.left {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = self.registry.clone();
        let room_id = std::mem::take(&mut self.room_id);
        let handle = self.handle.clone();
        runtime.spawn(async move {
            leave_room(&registry, &room_id, &handle).await;
        });
    }
}

async fn leave_room(registry: &RoomRegistry, room_id: &str, handle: &PeerHandle) {
    match registry.leave(room_id, handle).await {
        LeaveOutcome::RoomEmpty => {
            tracing::info!(room_id = %room_id, "Room is now empty and has been removed");
        }
        LeaveOutcome::Remaining(members) => broadcast_peer_list(room_id, &members),
        LeaveOutcome::NotMember => {
            tracing::debug!(
                peer_id = %handle.peer_id(),
                room_id = %room_id,
                "Connection was already superseded, registry untouched"
            );
        }
    }

    tracing::info!(peer_id = %handle.peer_id(), room_id = %room_id, "Peer left room");
}

/// 방 멤버 전원에게 현재 피어 목록 전송
pub fn broadcast_peer_list(room_id: &str, members: &[PeerHandle]) {
    let peer_ids = members.iter().map(|m| m.peer_id().to_string()).collect();
    let frame = match encode_downlink(&DownlinkMessage::peer_list(peer_ids)) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(room_id = %room_id, error = %e, "Failed to encode peer list");
            return;
        }
    };

    for member in members {
        if let Err(e) = member.send(frame.clone()) {
            tracing::warn!(
                room_id = %room_id,
                target = %member.peer_id(),
                error = %e,
                "Failed to send peer list"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_downlink, Frame};
    use crate::state::{Outbound, OUTBOUND_QUEUE_SIZE};
    use tokio::sync::mpsc::{self, Receiver};

    fn connect(peer_id: &str) -> (PeerHandle, Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        (PeerHandle::new(peer_id, tx), rx)
    }

    /// 수신 대기 중인 멤버 목록 갱신들 (정렬된 피어 ID)
    fn peer_lists(rx: &mut Receiver<Outbound>) -> Vec<Vec<String>> {
        let mut lists = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            let Outbound::Frame(Frame::Text(text)) = outbound else {
                continue;
            };
            let downlink = decode_downlink(text.as_bytes(), false).unwrap();
            let mut ids = downlink.peer_ids().expect("peer list update");
            ids.sort();
            lists.push(ids);
        }
        lists
    }

    #[tokio::test]
    async fn membership_updates_follow_joins_and_leaves() {
        let registry = Arc::new(RoomRegistry::new());
        let (b, mut rx_b) = connect("B");
        let (c, mut rx_c) = connect("C");
        let (a, mut rx_a) = connect("A");

        let mb = Membership::join(registry.clone(), "R".to_string(), b).await;
        let mc = Membership::join(registry.clone(), "R".to_string(), c).await;
        peer_lists(&mut rx_b);
        peer_lists(&mut rx_c);

        let ma = Membership::join(registry.clone(), "R".to_string(), a).await;
        assert_eq!(peer_lists(&mut rx_b), [["A", "B", "C"]]);
        assert_eq!(peer_lists(&mut rx_c), [["A", "B", "C"]]);
        assert_eq!(peer_lists(&mut rx_a), [["A", "B", "C"]]);

        mc.leave().await;
        assert_eq!(peer_lists(&mut rx_a), [["A", "B"]]);
        assert_eq!(peer_lists(&mut rx_b), [["A", "B"]]);
        assert!(peer_lists(&mut rx_c).is_empty());

        ma.leave().await;
        assert_eq!(peer_lists(&mut rx_b), [["B"]]);
        mb.leave().await;
        assert!(peer_lists(&mut rx_a).is_empty());
        assert!(peer_lists(&mut rx_b).is_empty());
        assert!(!registry.contains_room("R").await);
    }

    #[tokio::test]
    async fn rejoin_closes_previous_connection_quietly() {
        let registry = Arc::new(RoomRegistry::new());
        let (old, mut rx_old) = connect("A");
        let (new, _rx_new) = connect("A");
        let (b, mut rx_b) = connect("B");

        let m_old = Membership::join(registry.clone(), "R".to_string(), old).await;
        let _m_b = Membership::join(registry.clone(), "R".to_string(), b).await;
        let _m_new = Membership::join(registry.clone(), "R".to_string(), new).await;

        let mut closed = None;
        while let Ok(outbound) = rx_old.try_recv() {
            if let Outbound::Close { code, .. } = outbound {
                closed = Some(code);
            }
        }
        assert_eq!(closed, Some(CLOSE_SUPERSEDED));

        peer_lists(&mut rx_b);
        m_old.leave().await;
        assert!(peer_lists(&mut rx_b).is_empty());
        assert_eq!(registry.snapshot("R").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dropped_membership_still_leaves() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, _rx_a) = connect("A");

        let membership = Membership::join(registry.clone(), "R".to_string(), a).await;
        drop(membership);

        for _ in 0..10 {
            if !registry.contains_room("R").await {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("room should be removed after the membership is dropped");
    }
}
