//! 클라이언트-서버 와이어 프로토콜

pub mod codec;
pub mod messages;

pub use codec::*;
pub use messages::*;
