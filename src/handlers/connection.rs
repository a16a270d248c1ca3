//! 연결 핸들러 (세션 수명주기)

use super::room::Membership;
use super::signaling::Relay;
use crate::error::RelayError;
use crate::protocol::{decode_uplink, Frame};
use crate::state::{AppState, Outbound, PeerHandle, OUTBOUND_QUEUE_SIZE};
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// 같은 peer_id의 새 연결로 대체됨
pub const CLOSE_SUPERSEDED: u16 = 4000;
/// 송신자의 방이 더 이상 존재하지 않음
pub const CLOSE_ROOM_GONE: u16 = 4001;

/// 세션 종료 후 송신 태스크가 남은 프레임을 쓰도록 기다리는 시간
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
        }
    }
}

/// 업그레이드된 WebSocket 처리
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room_id: String, peer_id: String) {
    let (ws_sender, ws_receiver) = socket.split();
    serve_connection(ws_receiver, ws_sender, &state, room_id, peer_id).await;
}

async fn serve_connection<R, S>(
    receiver: R,
    sink: S,
    state: &AppState,
    room_id: String,
    peer_id: String,
) where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    let (tx, rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE_SIZE);

    // 송신 태스크
    let send_task = tokio::spawn(forward_outbound(rx, sink, peer_id.clone()));

    let session = Session::start(state, room_id, PeerHandle::new(peer_id, tx)).await;
    session.run(receiver).await;

    // 퇴장으로 핸들이 모두 드롭되면 송신 태스크는 큐를 비우고 끝난다.
    // 대기 중인 close 프레임(4000/4001)이 잘리지 않도록 잠시 기다린다.
    let abort = send_task.abort_handle();
    if tokio::time::timeout(FLUSH_TIMEOUT, send_task).await.is_err() {
        abort.abort();
    }
}

/// 송신 큐의 프레임을 소켓에 쓴다. close 요청이나 쓰기 실패 시 종료.
async fn forward_outbound<S>(mut rx: mpsc::Receiver<Outbound>, mut sink: S, peer_id: String)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame(frame) => {
                if let Err(e) = sink.send(frame.into()).await {
                    tracing::warn!(
                        peer_id = %peer_id,
                        error = %e,
                        "Failed to send message to peer"
                    );
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let close = Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                }));
                if let Err(e) = sink.send(close).await {
                    tracing::debug!(
                        peer_id = %peer_id,
                        code,
                        error = %e,
                        "Failed to send close frame"
                    );
                }
                break;
            }
        }
    }
}

/// 한 클라이언트 연결의 세션
///
/// `start`에서 방에 입장하고 (Joining → Active), `run`이 수신 루프를 돌다가
/// 채널이 닫히면 퇴장 처리까지 마친다 (Closing → Closed).
pub struct Session {
    membership: Membership,
    relay: Relay,
}

impl Session {
    pub async fn start(state: &AppState, room_id: String, handle: PeerHandle) -> Self {
        Self {
            membership: Membership::join(state.registry.clone(), room_id, handle).await,
            relay: state.relay.clone(),
        }
    }

    pub fn peer_id(&self) -> &str {
        self.membership.handle().peer_id()
    }

    pub fn room_id(&self) -> &str {
        self.membership.room_id()
    }

    /// 수신 루프 실행 후 퇴장 처리
    pub async fn run<S>(self, mut receiver: S)
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        self.receive_loop(&mut receiver).await;
        drop(receiver);
        self.membership.leave().await;
    }

    async fn receive_loop<S>(&self, receiver: &mut S)
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        while let Some(result) = receiver.next().await {
            let (bytes, is_binary) = match result {
                Ok(Message::Text(text)) => (text.into_bytes(), false),
                Ok(Message::Binary(bytes)) => (bytes, true),
                Ok(Message::Close(frame)) => {
                    self.log_close(frame.as_ref());
                    return;
                }
                // ping/pong은 axum이 처리
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(
                        peer_id = %self.peer_id(),
                        room_id = %self.room_id(),
                        error = %e,
                        "WebSocket error"
                    );
                    return;
                }
            };

            let uplink = match decode_uplink(&bytes, is_binary) {
                Ok(uplink) => uplink,
                Err(e) => {
                    tracing::warn!(
                        peer_id = %self.peer_id(),
                        binary = is_binary,
                        error = %e,
                        "Failed to decode message"
                    );
                    continue;
                }
            };

            match self
                .relay
                .relay(self.membership.handle(), self.room_id(), uplink)
                .await
            {
                Ok(_) => {}
                Err(e @ (RelayError::RoomNotFound(_) | RelayError::StaleSession { .. })) => {
                    tracing::error!(
                        peer_id = %self.peer_id(),
                        error = %e,
                        "Closing connection"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        peer_id = %self.peer_id(),
                        error = %e,
                        "Failed to process message"
                    );
                }
            }
        }
    }

    fn log_close(&self, frame: Option<&CloseFrame<'static>>) {
        match frame {
            Some(frame) if !is_expected_close(frame.code) => {
                tracing::warn!(
                    peer_id = %self.peer_id(),
                    room_id = %self.room_id(),
                    code = frame.code,
                    reason = %frame.reason,
                    "Connection closed unexpectedly"
                );
            }
            _ => {}
        }
    }
}

fn is_expected_close(code: u16) -> bool {
    matches!(
        code,
        close_code::NORMAL | close_code::AWAY | CLOSE_SUPERSEDED | CLOSE_ROOM_GONE
    )
}
