//! 피어 메시지 중계 (브로드캐스트 / 대상 지정)

use super::connection::{CLOSE_ROOM_GONE, CLOSE_SUPERSEDED};
use crate::error::RelayError;
use crate::protocol::{encode_downlink, DownlinkMessage, Frame, TargetPeers, UplinkMessage};
use crate::state::{PeerHandle, RoomRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// 업링크 메시지를 같은 방의 다른 피어들에게 전달한다
#[derive(Debug, Clone)]
pub struct Relay {
    registry: Arc<RoomRegistry>,
    /// 테스트용 인위적 전달 지연
    delay: Duration,
}

impl Relay {
    pub fn new(registry: Arc<RoomRegistry>, delay: Duration) -> Self {
        Self { registry, delay }
    }

    /// 메시지를 중계하고 전달 대상 수를 반환
    ///
    /// 송신자의 방이 없거나 송신자가 이미 다른 연결로 대체되었으면
    /// 송신자 채널을 닫고 에러를 반환한다.
    pub async fn relay(
        &self,
        sender: &PeerHandle,
        room_id: &str,
        mut uplink: UplinkMessage,
    ) -> Result<usize, RelayError> {
        let target_peers = uplink.target_peers.take();
        let downlink = DownlinkMessage::relayed(uplink, sender.peer_id());
        let frame = encode_downlink(&downlink)?;

        let resolved = self
            .registry
            .with_room(room_id, |members| match members.get(sender.peer_id()) {
                Some(current) if current.is_same_connection(sender) => Some(resolve_targets(
                    members,
                    sender.peer_id(),
                    target_peers.as_ref(),
                )),
                _ => None,
            })
            .await;

        let targets = match resolved {
            Some(Some(targets)) => targets,
            Some(None) => {
                sender.close(CLOSE_SUPERSEDED, "superseded by a newer connection");
                return Err(RelayError::StaleSession {
                    room_id: room_id.to_string(),
                    peer_id: sender.peer_id().to_string(),
                });
            }
            None => {
                sender.close(CLOSE_ROOM_GONE, "room not found");
                return Err(RelayError::RoomNotFound(room_id.to_string()));
            }
        };

        let count = targets.len();
        tracing::debug!(
            from = %sender.peer_id(),
            room_id = %room_id,
            action = %downlink.action,
            binary = frame.is_binary(),
            targets = count,
            "Relaying message"
        );

        if self.delay.is_zero() {
            deliver(&targets, &frame, sender.peer_id());
        } else {
            let delay = self.delay;
            let from = sender.peer_id().to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                deliver(&targets, &frame, &from);
            });
        }

        Ok(count)
    }
}

/// 전달 대상 결정 (송신자는 항상 제외, 중복 대상은 한 번만)
fn resolve_targets(
    members: &HashMap<String, PeerHandle>,
    sender_peer_id: &str,
    target_peers: Option<&TargetPeers>,
) -> Vec<PeerHandle> {
    let Some(target_peers) = target_peers else {
        return members
            .values()
            .filter(|member| member.peer_id() != sender_peer_id)
            .cloned()
            .collect();
    };

    let mut seen = HashSet::new();
    target_peers
        .ids()
        .iter()
        .filter(|id| id.as_str() != sender_peer_id && seen.insert(id.as_str()))
        .filter_map(|id| members.get(id))
        .cloned()
        .collect()
}

/// 대상별 전송, 실패는 개별 로그만 남기고 계속 진행
fn deliver(targets: &[PeerHandle], frame: &Frame, from: &str) {
    for target in targets {
        if let Err(e) = target.send(frame.clone()) {
            tracing::warn!(
                from = %from,
                target = %target.peer_id(),
                error = %e,
                "Failed to send message to peer"
            );
        }
    }
}
