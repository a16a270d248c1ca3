//! P2P Live Share WebSocket 시그널링 서버
//!
//! 클라이언트는 `/{roomId}/{peerId}`로 접속해 방에 입장하고, 서버는 페이로드를
//! 해석하지 않고 같은 방의 다른 피어들에게 메시지를 중계한다.

pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod state;

use axum::{
    routing::{any, get},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// 라우터 설정
pub fn build_router(state: Arc<AppState>) -> Router {
    // CORS 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/",
            get(handlers::index_handler).fallback(handlers::not_found),
        )
        .route("/:room_id/:peer_id", any(handlers::ws_handler))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
