//! HTTP 엔드포인트 (상태 페이지, WebSocket 업그레이드)

use super::connection::handle_socket;
use crate::state::AppState;
use axum::{
    extract::{ws::rejection::WebSocketUpgradeRejection, Path, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// 상태 페이지
pub async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let room_count = state.registry.room_count().await;
    (
        [(header::CONTENT_TYPE, "text/plain")],
        format!("P2P Live Share WebSocket Signaling Server. {room_count} active room(s)."),
    )
}

/// `/{roomId}/{peerId}` 업그레이드 처리
pub async fn ws_handler(
    Path((room_id, peer_id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !is_valid_id(&room_id) || !is_valid_id(&peer_id) {
        return not_found().await.into_response();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, peer_id)),
        Err(rejection) => {
            tracing::warn!(
                room_id = %room_id,
                peer_id = %peer_id,
                error = %rejection,
                "Upgrade failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Upgrade failed").into_response()
        }
    }
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// 방/피어 ID는 `[A-Za-z0-9_-]+`
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_character_class() {
        assert!(is_valid_id("room-1_A"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("a.b"));
        assert!(!is_valid_id("a b"));
        assert!(!is_valid_id("방"));
    }
}
